//! Named, indexed feature matrix

use crate::error::{ShapSelectError, Result};
use ndarray::{Array2, Axis};
use polars::prelude::*;
use std::collections::HashSet;

/// Ordered collection of named f64 columns over a fixed list of row identifiers.
///
/// Rows are addressed two ways: by identifier (`index()`, as supplied by the
/// caller) and by position (`0..n_rows()`). Cross-validation works on
/// positions; identifiers only have to agree with the target vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    index: Vec<i64>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Create a matrix with a default `0..n` row index
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        let index = (0..values.nrows() as i64).collect();
        Self::with_index(columns, index, values)
    }

    /// Create a matrix with explicit row identifiers
    pub fn with_index(columns: Vec<String>, index: Vec<i64>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(ShapSelectError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        if index.len() != values.nrows() {
            return Err(ShapSelectError::ShapeError {
                expected: format!("{} rows", index.len()),
                actual: format!("{} rows", values.nrows()),
            });
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(ShapSelectError::DataError(format!(
                    "Duplicate column name '{}'",
                    name
                )));
            }
        }

        let mut seen_ids = HashSet::with_capacity(index.len());
        for id in &index {
            if !seen_ids.insert(*id) {
                return Err(ShapSelectError::DataError(format!(
                    "Duplicate row identifier {}",
                    id
                )));
            }
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(ShapSelectError::DataError(
                "Feature matrix contains NaN or infinite values".to_string(),
            ));
        }

        Ok(Self { columns, index, values })
    }

    /// Build from every column of a DataFrame, using a `0..n` row index
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let values = columns_to_array2(df, &names)?;
        Self::new(names, values)
    }

    /// Build from a DataFrame, taking row identifiers from `index_column`
    pub fn from_dataframe_with_index(df: &DataFrame, index_column: &str) -> Result<Self> {
        let index_series = df
            .column(index_column)
            .map_err(|_| ShapSelectError::FeatureNotFound(index_column.to_string()))?
            .cast(&DataType::Int64)?;
        let index = index_series
            .i64()?
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| {
                    ShapSelectError::DataError(format!("Null value in index column '{}'", index_column))
                })
            })
            .collect::<Result<Vec<i64>>>()?;

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != index_column)
            .map(|s| s.to_string())
            .collect();
        let values = columns_to_array2(df, &names)?;
        Self::with_index(names, index, values)
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row identifiers in order
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// Underlying values, rows x columns
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// Position of a column by name
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Restrict to the named columns, in the order given
    pub fn select_columns(&self, names: &[String]) -> Result<Self> {
        let positions = names
            .iter()
            .map(|name| {
                self.column_position(name)
                    .ok_or_else(|| ShapSelectError::FeatureNotFound(name.clone()))
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(Self {
            columns: names.to_vec(),
            index: self.index.clone(),
            values: self.values.select(Axis(1), &positions),
        })
    }
}

/// Extract named columns from a DataFrame into a row-major `Array2<f64>`.
pub(crate) fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let series = df
                .column(col_name)
                .map_err(|_| ShapSelectError::FeatureNotFound(col_name.clone()))?;
            let series_f64 = series.cast(&DataType::Float64)?;
            series_f64
                .f64()?
                .into_iter()
                .map(|v| {
                    v.ok_or_else(|| {
                        ShapSelectError::DataError(format!("Null value in column '{}'", col_name))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}
