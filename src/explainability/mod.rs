//! Model explainability module
//!
//! SHAP attributions used as feature importances by recursive elimination.

mod shap;

pub use shap::{
    mean_abs_shap, Attributions, SamplingExplainer, SamplingExplainerConfig, ShapExplainer,
    ShapExplanation, ShapOptions, MAX_EXACT_FEATURES,
};
