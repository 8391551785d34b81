//! Recursive feature elimination with SHAP importances
//!
//! - [`ShapRfeCv`] runs the round loop over cross-validated folds
//! - [`EarlyStoppingShapRfeCv`] fits each fold with a held-out monitor slice
//! - [`EliminationReport`] holds the per-round trace used for selection
//!   and plotting

mod config;
mod engine;
mod fold;
mod plot;
mod report;
mod step;

pub use config::{EarlyStoppingConfig, EliminationConfig, Step};
pub use engine::{EarlyStoppingShapRfeCv, EliminationState, ShapRfeCv};
pub use fold::{
    normalize_attributions, EarlyStoppingFoldEvaluator, FoldEvaluator, FoldResult, FoldTask,
    PlainFoldEvaluator,
};
pub use plot::{EliminationPlot, ScoreCurve};
pub use report::{EliminationReport, RoundRecord};
pub use step::features_to_remove;
