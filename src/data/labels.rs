//! Target vector validation and normalization

use crate::error::{ShapSelectError, Result};
use ndarray::Array1;
use polars::prelude::*;
use tracing::warn;

/// Binary target aligned to a feature matrix index
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    name: String,
    index: Vec<i64>,
    values: Array1<f64>,
}

impl Target {
    /// Labels as `{0.0, 1.0}`
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build from a polars Series, aligned to `index`
    pub fn from_series(series: &Series, index: &[i64]) -> Result<Self> {
        let values = series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| ShapSelectError::DataError(format!("Null label in '{}'", series.name())))
            })
            .collect::<Result<Vec<f64>>>()?;
        preprocess_labels(&values, series.name().as_str(), index)
    }
}

/// Validate labels and coerce them into a binary `{0, 1}` target.
///
/// Two distinct label values other than 0/1 are mapped in sorted order
/// (smaller to 0, larger to 1). A single class is rejected since no
/// classification metric is defined for it.
pub fn preprocess_labels(values: &[f64], name: &str, index: &[i64]) -> Result<Target> {
    if values.len() != index.len() {
        return Err(ShapSelectError::ShapeError {
            expected: format!("{} labels", index.len()),
            actual: format!("{} labels", values.len()),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ShapSelectError::DataError(format!(
            "Target '{}' contains NaN or infinite values",
            name
        )));
    }

    let mut classes: Vec<f64> = values.to_vec();
    classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    classes.dedup();

    match classes.len() {
        0 => Err(ShapSelectError::DataError(format!("Target '{}' is empty", name))),
        1 => Err(ShapSelectError::DataError(format!(
            "Target '{}' contains a single class ({})",
            name, classes[0]
        ))),
        2 => {
            let (low, high) = (classes[0], classes[1]);
            if low != 0.0 || high != 1.0 {
                warn!(target_name = name, low, high, "Remapping binary labels to 0/1");
            }
            let mapped: Array1<f64> = values
                .iter()
                .map(|&v| if v == high { 1.0 } else { 0.0 })
                .collect();
            Ok(Target {
                name: name.to_string(),
                index: index.to_vec(),
                values: mapped,
            })
        }
        n => Err(ShapSelectError::DataError(format!(
            "Target '{}' has {} classes, only binary classification is supported",
            name, n
        ))),
    }
}
