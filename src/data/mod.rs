//! Tabular inputs: named feature matrix and binary target

mod frame;
mod labels;

pub use frame::FeatureMatrix;
pub use labels::{preprocess_labels, Target};
