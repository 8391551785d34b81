//! shap-select - Recursive feature elimination driven by SHAP values
//!
//! Given a tabular binary classification dataset and a classifier (or a
//! hyperparameter search over one), find the smallest feature subset that
//! keeps cross-validated performance, and report the full elimination trace.
//!
//! # Modules
//!
//! ## Core
//! - [`feature_elimination`] - The elimination loop, fold evaluators, trace and plot data
//!
//! ## Collaborators
//! - [`data`] - Named feature matrices and binary targets
//! - [`training`] - Classifiers and cross-validation splitters
//! - [`optimizer`] - Search spaces and randomized search
//! - [`explainability`] - Model-agnostic SHAP values
//! - [`metrics`] - Named scorers
//!
//! ## Utilities
//! - [`utils`] - Logging setup
//!
//! # Example
//!
//! ```no_run
//! use shap_select::prelude::*;
//! use polars::prelude::*;
//!
//! # fn main() -> shap_select::Result<()> {
//! let df = df!(
//!     "col_1" => [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0],
//!     "col_2" => [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
//!     "col_3" => [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0],
//! )?;
//! let x = FeatureMatrix::from_dataframe(&df)?;
//! let y = preprocess_labels(&[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0], "y", x.index())?;
//!
//! let model = Fittable::estimator(DecisionTreeClassifier::new().with_max_depth(1));
//! let config = EliminationConfig::new().with_step(1usize).with_cv(2).with_random_state(1);
//!
//! let mut elimination = ShapRfeCv::new(model, config);
//! let report = elimination.fit_compute(&x, &y, &[], ShapOptions::default())?;
//! println!("{}", report);
//! let best = elimination.get_reduced_features_set(1)?;
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Data handling
pub mod data;

// Models and search
pub mod training;
pub mod optimizer;

// Attribution and scoring
pub mod explainability;
pub mod metrics;

// Elimination
pub mod feature_elimination;

// Utilities
pub mod utils;

pub use error::{ShapSelectError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ShapSelectError, Result};

    // Data
    pub use crate::data::{preprocess_labels, FeatureMatrix, Target};

    // Training
    pub use crate::training::{
        Classifier, DecisionTreeClassifier, FitOptions, Fittable, GradientBoostingClassifier,
        GradientBoostingConfig, HyperparameterSearch, LogisticRegression,
    };

    // Optimization
    pub use crate::optimizer::{ParameterValue, RandomizedSearchConfig, RandomizedSearchCv, SearchSpace};

    // Explainability
    pub use crate::explainability::{SamplingExplainer, SamplingExplainerConfig, ShapExplainer, ShapOptions};

    // Scoring
    pub use crate::metrics::{get_scorer, Scorer};

    // Feature elimination
    pub use crate::feature_elimination::{
        EarlyStoppingConfig, EarlyStoppingShapRfeCv, EliminationConfig, EliminationReport, ShapRfeCv,
        Step,
    };

    // Logging
    pub use crate::utils::init_logging;
}
