//! Linear models

use super::models::{binary_proba, Classifier, FitOptions};
use crate::error::{ShapSelectError, Result};
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// L2-regularized logistic regression fitted by batch gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Regularization strength (L2) on the mean log-loss
    pub alpha: f64,
    /// Inverse regularization strength on the summed log-loss; overrides
    /// `alpha` with `1 / (C * n_samples)` at fit time when set
    #[serde(default)]
    pub c: Option<f64>,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha: 0.01,
            c: None,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
        }
    }

    /// Set regularization strength
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self.c = None;
        self
    }

    /// Set regularization as inverse strength over the summed loss,
    /// so the penalty on the mean loss is `1 / (C * n_samples)`
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = Some(c);
        self
    }

    /// L2 penalty applied to the mean log-loss for `n_samples` rows
    pub fn effective_alpha(&self, n_samples: usize) -> f64 {
        match self.c {
            Some(c) => 1.0 / (c * n_samples.max(1) as f64),
            None => self.alpha,
        }
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    /// Sigmoid function
    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Fit the model using gradient descent
    pub fn fit_gd(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
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
                "Cannot fit logistic regression on zero samples".to_string(),
            ));
        }
        if let Some(c) = self.c {
            if !(c > 0.0 && c.is_finite()) {
                return Err(ShapSelectError::InvalidParameter {
                    name: "C".to_string(),
                    value: c.to_string(),
                    reason: "must be a finite positive number".to_string(),
                });
            }
        }
        let alpha = self.effective_alpha(n_samples);
        if !(alpha >= 0.0 && alpha.is_finite()) {
            return Err(ShapSelectError::InvalidParameter {
                name: "alpha".to_string(),
                value: alpha.to_string(),
                reason: "must be a finite non-negative number".to_string(),
            });
        }

        let mut weights = Array1::zeros(n_features);
        let mut bias = 0.0;

        let lr = self.learning_rate;

        for _iter in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            let errors = &predictions - y;
            let dw = (x.t().dot(&errors) / n_samples as f64) + (alpha * &weights);
            let db = if self.fit_intercept {
                errors.mean().unwrap_or(0.0)
            } else {
                0.0
            };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        if weights.iter().any(|w: &f64| !w.is_finite()) || !bias.is_finite() {
            return Err(ShapSelectError::TrainingError(
                "Logistic regression diverged".to_string(),
            ));
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);

        Ok(self)
    }

    /// Positive-class probabilities
    pub fn predict_positive(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(ShapSelectError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(ShapSelectError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let intercept = self.intercept.unwrap_or(0.0);

        let linear = x.dot(coefficients) + intercept;
        Ok(Self::sigmoid(&linear))
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, _options: &FitOptions) -> Result<()> {
        self.fit_gd(x, y)?;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(binary_proba(&self.predict_positive(x)?))
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        let invalid = || ShapSelectError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a positive number".to_string(),
        };

        match name {
            "C" => {
                self.c = Some(value.as_float().filter(|c| *c > 0.0).ok_or_else(invalid)?);
            }
            "alpha" => {
                self.alpha = value.as_float().filter(|a| *a >= 0.0).ok_or_else(invalid)?;
                self.c = None;
            }
            "learning_rate" => {
                self.learning_rate = value.as_float().filter(|lr| *lr > 0.0).ok_or_else(invalid)?
            }
            "max_iter" => self.max_iter = value.as_usize().filter(|m| *m > 0).ok_or_else(invalid)?,
            _ => {
                return Err(ShapSelectError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "unknown parameter for LogisticRegression".to_string(),
                })
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}
