//! Model training module
//!
//! Binary classifiers consumed by feature elimination:
//! - Decision trees (CART)
//! - Logistic regression
//! - Gradient boosting with early stopping
//!
//! plus the cross-validation splitters used to build folds.

mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;

pub use models::{positive_proba, Classifier, EvalSet, FitOptions, Fittable, HyperparameterSearch};
pub(crate) use models::binary_proba;
pub use cross_validation::{train_test_split, CVResults, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, DecisionTreeClassifier, TreeNode};
pub use gradient_boosting::{EvalMetric, GradientBoostingClassifier, GradientBoostingConfig};
pub use linear_models::LogisticRegression;
