//! Per-fold fit, score and explain

use super::config::EarlyStoppingConfig;
use crate::error::{ShapSelectError, Result};
use crate::explainability::{Attributions, ShapExplainer, ShapOptions};
use crate::metrics::Scorer;
use crate::training::{train_test_split, Classifier, EvalSet, FitOptions, Fittable};
use ndarray::{Array1, Array2, Axis};
use std::fmt;
use tracing::debug;

/// What one fold contributes to a round
#[derive(Debug, Clone)]
pub struct FoldResult {
    /// `[validation rows x active features]`, positive class
    pub shap_values: Array2<f64>,
    pub train_score: f64,
    pub val_score: f64,
}

/// Inputs of a single fold evaluation
pub struct FoldTask<'a> {
    /// Feature values restricted to the active features
    pub x: &'a Array2<f64>,
    pub y: &'a Array1<f64>,
    pub model: &'a Fittable,
    /// Row positions used for fitting
    pub train: &'a [usize],
    /// Row positions scored and explained
    pub val: &'a [usize],
    pub scorer: &'a Scorer,
    pub explainer: &'a dyn ShapExplainer,
    pub shap_options: &'a ShapOptions,
    pub random_state: Option<u64>,
    pub fold_idx: usize,
}

/// Turns one train/validation split into a [`FoldResult`]
pub trait FoldEvaluator: Send + Sync + fmt::Debug {
    fn evaluate(&self, task: &FoldTask<'_>) -> Result<FoldResult>;

    /// Reject models this evaluator cannot drive, before any fold work
    fn validate(&self, _model: &Fittable) -> Result<()> {
        Ok(())
    }
}

/// Fits on the whole training fold
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFoldEvaluator;

impl FoldEvaluator for PlainFoldEvaluator {
    fn evaluate(&self, task: &FoldTask<'_>) -> Result<FoldResult> {
        let x_train = task.x.select(Axis(0), task.train);
        let y_train = task.y.select(Axis(0), task.train);

        let fitted = task.model.fit_clone(&x_train, &y_train, &FitOptions::new())?;
        score_and_explain(task, fitted.as_ref(), &x_train, &y_train)
    }
}

/// Holds a monitor slice out of the training fold and fits with early
/// stopping against it
#[derive(Debug, Clone, Default)]
pub struct EarlyStoppingFoldEvaluator {
    config: EarlyStoppingConfig,
}

impl EarlyStoppingFoldEvaluator {
    pub fn new(config: EarlyStoppingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EarlyStoppingConfig {
        &self.config
    }
}

impl FoldEvaluator for EarlyStoppingFoldEvaluator {
    fn evaluate(&self, task: &FoldTask<'_>) -> Result<FoldResult> {
        let (fit_rows, monitor_rows) = train_test_split(
            task.train,
            task.y,
            self.config.monitor_fraction,
            self.config.stratify_monitor,
            task.random_state,
        )?;

        let eval_set = EvalSet {
            x: task.x.select(Axis(0), &monitor_rows),
            y: task.y.select(Axis(0), &monitor_rows),
        };
        let options = FitOptions::new().with_early_stopping(
            eval_set,
            self.config.early_stopping_rounds,
            self.config.eval_metric.clone(),
        );

        let x_fit = task.x.select(Axis(0), &fit_rows);
        let y_fit = task.y.select(Axis(0), &fit_rows);
        let fitted = task.model.fit_clone(&x_fit, &y_fit, &options)?;

        // Training score covers the monitor slice too
        let x_train = task.x.select(Axis(0), task.train);
        let y_train = task.y.select(Axis(0), task.train);
        score_and_explain(task, fitted.as_ref(), &x_train, &y_train)
    }

    fn validate(&self, model: &Fittable) -> Result<()> {
        self.config.validate()?;
        if !model.supports_early_stopping() {
            return Err(ShapSelectError::ConfigError(format!(
                "{} does not support early stopping",
                model.name()
            )));
        }
        Ok(())
    }
}

fn score_and_explain(
    task: &FoldTask<'_>,
    fitted: &dyn Classifier,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
) -> Result<FoldResult> {
    let x_val = task.x.select(Axis(0), task.val);
    let y_val = task.y.select(Axis(0), task.val);

    let train_score = task.scorer.score(fitted, x_train, y_train)?;
    let val_score = task.scorer.score(fitted, &x_val, &y_val)?;

    let attributions = task
        .explainer
        .shap_values(fitted, x_train, &x_val, task.shap_options)?;
    let shap_values = normalize_attributions(attributions, x_val.nrows(), x_val.ncols())?;

    debug!(
        fold = task.fold_idx,
        train_score,
        val_score,
        n_features = x_val.ncols(),
        "Fold evaluated"
    );

    Ok(FoldResult {
        shap_values,
        train_score,
        val_score,
    })
}

/// Reduce explainer output to the positive-class matrix and check its shape
pub fn normalize_attributions(
    attributions: Attributions,
    n_rows: usize,
    n_cols: usize,
) -> Result<Array2<f64>> {
    let matrix = match attributions {
        Attributions::Single(matrix) => matrix,
        Attributions::PerClass(mut per_class) => {
            if per_class.len() < 2 {
                return Err(ShapSelectError::ShapeError {
                    expected: "at least 2 per-class attribution matrices".to_string(),
                    actual: format!("{} matrices", per_class.len()),
                });
            }
            per_class.swap_remove(1)
        }
    };

    if matrix.dim() != (n_rows, n_cols) {
        return Err(ShapSelectError::ShapeError {
            expected: format!("({}, {}) attributions", n_rows, n_cols),
            actual: format!("{:?}", matrix.dim()),
        });
    }
    Ok(matrix)
}
