//! Gradient Boosting implementation
//!
//! Log-loss boosting over regression trees with row/column subsampling and
//! optional early stopping against a monitored evaluation set.

use super::decision_tree::DecisionTree;
use super::models::{binary_proba, Classifier, FitOptions};
use crate::error::{ShapSelectError, Result};
use crate::metrics::roc_auc_score;
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio
    pub colsample_bytree: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            random_state: Some(42),
        }
    }
}

/// Metric monitored on the evaluation set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EvalMetric {
    Auc,
    LogLoss,
    Error,
}

impl EvalMetric {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "auc" | "roc_auc" => Ok(EvalMetric::Auc),
            "logloss" | "binary_logloss" | "log_loss" => Ok(EvalMetric::LogLoss),
            "error" | "binary_error" => Ok(EvalMetric::Error),
            other => Err(ShapSelectError::InvalidParameter {
                name: "eval_metric".to_string(),
                value: other.to_string(),
                reason: "expected one of auc, logloss, error".to_string(),
            }),
        }
    }

    fn greater_is_better(&self) -> bool {
        matches!(self, EvalMetric::Auc)
    }

    fn evaluate(&self, y: &Array1<f64>, p: &Array1<f64>) -> Result<f64> {
        match self {
            EvalMetric::Auc => roc_auc_score(y, p),
            EvalMetric::LogLoss => {
                let eps = 1e-15;
                let total: f64 = y
                    .iter()
                    .zip(p.iter())
                    .map(|(&yi, &pi)| {
                        let pi = pi.clamp(eps, 1.0 - eps);
                        -(yi * pi.ln() + (1.0 - yi) * (1.0 - pi).ln())
                    })
                    .sum();
                Ok(total / y.len() as f64)
            }
            EvalMetric::Error => {
                let wrong = y
                    .iter()
                    .zip(p.iter())
                    .filter(|(&yi, &pi)| (pi >= 0.5) != (yi >= 0.5))
                    .count();
                Ok(wrong as f64 / y.len() as f64)
            }
        }
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Gradient Boosting Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_log_odds: f64,
    n_features: usize,
    best_iteration: Option<usize>,
    fitted: bool,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_log_odds: 0.0,
            n_features: 0,
            best_iteration: None,
            fitted: false,
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    /// Number of trees kept after fitting
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Zero-based index of the best round when early stopping was active
    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    /// Fit binary classification
    pub fn fit_boosting(&mut self, x: &Array2<f64>, y: &Array1<f64>, options: &FitOptions) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ShapSelectError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(ShapSelectError::TrainingError(
                "Cannot fit gradient boosting on zero samples".to_string(),
            ));
        }
        if !(self.config.subsample > 0.0 && self.config.subsample <= 1.0) {
            return Err(ShapSelectError::InvalidParameter {
                name: "subsample".to_string(),
                value: self.config.subsample.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if !(self.config.colsample_bytree > 0.0 && self.config.colsample_bytree <= 1.0) {
            return Err(ShapSelectError::InvalidParameter {
                name: "colsample_bytree".to_string(),
                value: self.config.colsample_bytree.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }

        let monitor = match (&options.eval_set, options.early_stopping_rounds) {
            (Some(eval_set), Some(rounds)) => {
                if eval_set.x.ncols() != n_features {
                    return Err(ShapSelectError::ShapeError {
                        expected: format!("{} eval features", n_features),
                        actual: format!("{} eval features", eval_set.x.ncols()),
                    });
                }
                let metric = match &options.eval_metric {
                    Some(name) => EvalMetric::parse(name)?,
                    None => EvalMetric::LogLoss,
                };
                Some((eval_set, rounds.max(1), metric))
            }
            _ => None,
        };

        self.trees.clear();
        self.col_indices_per_tree.clear();
        self.best_iteration = None;
        self.n_features = n_features;

        let p = y.mean().unwrap_or(0.5).clamp(1e-6, 1.0 - 1e-6);
        self.initial_log_odds = (p / (1.0 - p)).ln();

        let mut log_odds = Array1::from_elem(n_samples, self.initial_log_odds);
        let mut eval_log_odds = monitor
            .as_ref()
            .map(|(eval_set, _, _)| Array1::from_elem(eval_set.x.nrows(), self.initial_log_odds));

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let mut best_score: Option<f64> = None;
        let mut rounds_without_improvement = 0;

        for round in 0..self.config.n_estimators {
            // Negative gradient of log loss
            let residuals: Array1<f64> = y
                .iter()
                .zip(log_odds.iter())
                .map(|(yi, &lo)| yi - sigmoid(lo))
                .collect();

            let sample_indices = self.subsample_indices(n_samples, &mut rng);
            let col_indices = self.colsample_indices(n_features, &mut rng);

            let x_sub = x.select(Axis(0), &sample_indices).select(Axis(1), &col_indices);
            let y_sub: Array1<f64> = sample_indices.iter().map(|&i| residuals[i]).collect();

            let mut tree = DecisionTree::new_regressor()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit(&x_sub, &y_sub)?;

            let tree_pred = tree.predict(&x.select(Axis(1), &col_indices))?;
            log_odds.scaled_add(self.config.learning_rate, &tree_pred);

            if let (Some((eval_set, rounds, metric)), Some(eval_lo)) = (&monitor, eval_log_odds.as_mut()) {
                let eval_pred = tree.predict(&eval_set.x.select(Axis(1), &col_indices))?;
                eval_lo.scaled_add(self.config.learning_rate, &eval_pred);
                let score = metric.evaluate(&eval_set.y, &eval_lo.mapv(sigmoid))?;

                let improved = match best_score {
                    None => true,
                    Some(best) if metric.greater_is_better() => score > best,
                    Some(best) => score < best,
                };

                if improved {
                    best_score = Some(score);
                    self.best_iteration = Some(round);
                    rounds_without_improvement = 0;
                } else {
                    rounds_without_improvement += 1;
                }

                self.trees.push(tree);
                self.col_indices_per_tree.push(col_indices);

                if rounds_without_improvement >= *rounds {
                    debug!(round, best_iteration = ?self.best_iteration, "Early stopping");
                    break;
                }
            } else {
                self.trees.push(tree);
                self.col_indices_per_tree.push(col_indices);
            }
        }

        if let Some(best) = self.best_iteration {
            self.trees.truncate(best + 1);
            self.col_indices_per_tree.truncate(best + 1);
        }
        self.fitted = true;

        Ok(())
    }

    /// Positive-class probabilities
    pub fn predict_positive(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(ShapSelectError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(ShapSelectError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut log_odds = Array1::from_elem(x.nrows(), self.initial_log_odds);
        for (tree, col_indices) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let tree_pred = tree.predict(&x.select(Axis(1), col_indices))?;
            log_odds.scaled_add(self.config.learning_rate, &tree_pred);
        }
        Ok(log_odds.mapv(sigmoid))
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let sample_size = ((n as f64) * self.config.subsample).ceil() as usize;
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(sample_size.max(1));
        indices.sort_unstable();
        indices
    }

    fn colsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let sample_size = ((n as f64) * self.config.colsample_bytree).ceil() as usize;
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(sample_size.max(1));
        indices.sort_unstable();
        indices
    }
}

impl Classifier for GradientBoostingClassifier {
    fn name(&self) -> &str {
        "GradientBoostingClassifier"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, options: &FitOptions) -> Result<()> {
        self.fit_boosting(x, y, options)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(binary_proba(&self.predict_positive(x)?))
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        let invalid = |reason: &str| ShapSelectError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match name {
            "n_estimators" => {
                self.config.n_estimators = value
                    .as_usize()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("expected a positive integer"))?
            }
            "max_depth" => {
                self.config.max_depth = value
                    .as_usize()
                    .ok_or_else(|| invalid("expected a non-negative integer"))?
            }
            "min_samples_leaf" => {
                self.config.min_samples_leaf = value
                    .as_usize()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("expected a positive integer"))?
            }
            "learning_rate" => {
                self.config.learning_rate = value
                    .as_float()
                    .filter(|lr| *lr > 0.0)
                    .ok_or_else(|| invalid("expected a positive number"))?
            }
            "subsample" => {
                self.config.subsample = value
                    .as_float()
                    .ok_or_else(|| invalid("expected a number in (0, 1]"))?
            }
            "colsample_bytree" => {
                self.config.colsample_bytree = value
                    .as_float()
                    .ok_or_else(|| invalid("expected a number in (0, 1]"))?
            }
            _ => return Err(invalid("unknown parameter for GradientBoostingClassifier")),
        }
        Ok(())
    }

    fn set_random_state(&mut self, seed: u64) {
        self.config.random_state = Some(seed);
    }

    fn supports_early_stopping(&self) -> bool {
        true
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::EvalSet;

    fn make_data(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 3));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let signal: f64 = rng.gen_range(-1.0..1.0);
            x[[i, 0]] = signal;
            x[[i, 1]] = rng.gen_range(-1.0..1.0);
            x[[i, 2]] = rng.gen_range(-1.0..1.0);
            y[i] = if signal + 0.1 * rng.gen_range(-1.0..1.0) > 0.0 { 1.0 } else { 0.0 };
        }
        (x, y)
    }

    #[test]
    fn test_fit_predict() {
        let (x, y) = make_data(200, 1);
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 30,
            ..Default::default()
        });
        model.fit(&x, &y, &FitOptions::new()).unwrap();

        assert_eq!(model.n_trees(), 30);
        let p = model.predict_positive(&x).unwrap();
        let auc = roc_auc_score(&y, &p).unwrap();
        assert!(auc > 0.95, "train AUC too low: {}", auc);
    }

    #[test]
    fn test_early_stopping_truncates_to_best_iteration() {
        let (x, y) = make_data(200, 2);
        let (x_eval, y_eval) = make_data(60, 3);

        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 500,
            ..Default::default()
        });
        let options = FitOptions::new().with_early_stopping(
            EvalSet { x: x_eval, y: y_eval },
            5,
            "binary_logloss",
        );
        model.fit(&x, &y, &options).unwrap();

        let best = model.best_iteration().unwrap();
        assert_eq!(model.n_trees(), best + 1);
        assert!(model.n_trees() < 500);
    }

    #[test]
    fn test_unknown_eval_metric() {
        let (x, y) = make_data(50, 4);
        let (x_eval, y_eval) = make_data(20, 5);
        let mut model = GradientBoostingClassifier::default();
        let options = FitOptions::new().with_early_stopping(EvalSet { x: x_eval, y: y_eval }, 5, "ndcg");
        assert!(model.fit(&x, &y, &options).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = GradientBoostingClassifier::default();
        assert!(model.predict_proba(&Array2::zeros((1, 3))).is_err());
    }
}
