//! Scoring metrics for binary classifiers
//!
//! Scorers are resolved by name and always follow "greater is better",
//! so loss metrics are exposed negated (`neg_log_loss`, `neg_brier_score`).

mod scoring;

pub use scoring::{
    accuracy_score, brier_score, confusion_counts, f1_score, get_scorer, log_loss,
    precision_score, recall_score, roc_auc_score, Scorer, ScorerKind,
};
