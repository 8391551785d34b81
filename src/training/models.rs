//! Estimator traits and the fittable model wrapper

use crate::error::{ShapSelectError, Result};
use crate::optimizer::{ParameterValue, TrialParams};
use ndarray::{Array1, Array2};
use std::fmt;

/// Held-out data monitored during bounded-iteration training
#[derive(Debug, Clone)]
pub struct EvalSet {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

/// Fit-time options passed through to an estimator
#[derive(Debug, Clone, Default)]
pub struct FitOptions {
    /// Monitoring data for early stopping
    pub eval_set: Option<EvalSet>,
    /// Stop after this many rounds without improvement on `eval_set`
    pub early_stopping_rounds: Option<usize>,
    /// Metric monitored on `eval_set`
    pub eval_metric: Option<String>,
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable early stopping against `eval_set`
    pub fn with_early_stopping(
        mut self,
        eval_set: EvalSet,
        rounds: usize,
        metric: impl Into<String>,
    ) -> Self {
        self.eval_set = Some(eval_set);
        self.early_stopping_rounds = Some(rounds);
        self.eval_metric = Some(metric.into());
        self
    }
}

/// Binary classifier contract.
///
/// Labels are `{0.0, 1.0}`; `predict_proba` returns an `(n_samples, 2)`
/// matrix whose column 1 is the positive class.
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Short model name used in logs and errors
    fn name(&self) -> &str;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, options: &FitOptions) -> Result<()>;

    /// Predict class probabilities
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Predict class labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.column(1).mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    /// Set a hyperparameter by name
    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        Err(ShapSelectError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: format!("{} has no tunable parameters", self.name()),
        })
    }

    /// Fix model-internal randomness
    fn set_random_state(&mut self, _seed: u64) {}

    /// Whether `fit` honours `FitOptions::early_stopping_rounds`
    fn supports_early_stopping(&self) -> bool {
        false
    }

    fn clone_box(&self) -> Box<dyn Classifier>;
}

impl Clone for Box<dyn Classifier> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Hyperparameter search over a base classifier
pub trait HyperparameterSearch: Send + Sync + fmt::Debug {
    /// Run the search and refit the best candidate
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, options: &FitOptions) -> Result<()>;

    /// Best refitted estimator, available after `fit`
    fn best_estimator(&self) -> Option<&dyn Classifier>;

    /// Parameters of the best candidate
    fn best_params(&self) -> Option<&TrialParams>;

    /// The unfitted estimator being tuned
    fn base_estimator(&self) -> &dyn Classifier;

    fn set_random_state(&mut self, seed: u64);

    fn clone_box(&self) -> Box<dyn HyperparameterSearch>;
}

impl Clone for Box<dyn HyperparameterSearch> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Something that can be fitted into a classifier: a plain estimator,
/// or a search whose best estimator is used.
#[derive(Debug, Clone)]
pub enum Fittable {
    Estimator(Box<dyn Classifier>),
    Search(Box<dyn HyperparameterSearch>),
}

impl Fittable {
    pub fn estimator(model: impl Classifier + 'static) -> Self {
        Fittable::Estimator(Box::new(model))
    }

    pub fn search(search: impl HyperparameterSearch + 'static) -> Self {
        Fittable::Search(Box::new(search))
    }

    pub fn is_search(&self) -> bool {
        matches!(self, Fittable::Search(_))
    }

    /// Name of the underlying estimator
    pub fn name(&self) -> &str {
        match self {
            Fittable::Estimator(model) => model.name(),
            Fittable::Search(search) => search.base_estimator().name(),
        }
    }

    pub fn supports_early_stopping(&self) -> bool {
        match self {
            Fittable::Estimator(model) => model.supports_early_stopping(),
            Fittable::Search(search) => search.base_estimator().supports_early_stopping(),
        }
    }

    pub fn set_random_state(&mut self, seed: u64) {
        match self {
            Fittable::Estimator(model) => model.set_random_state(seed),
            Fittable::Search(search) => search.set_random_state(seed),
        }
    }

    /// Fit a fresh copy and return the fitted best estimator.
    ///
    /// `self` is never mutated, so one `Fittable` can serve every fold.
    pub fn fit_clone(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        options: &FitOptions,
    ) -> Result<Box<dyn Classifier>> {
        match self {
            Fittable::Estimator(model) => {
                let mut fitted = model.clone_box();
                fitted.fit(x, y, options)?;
                Ok(fitted)
            }
            Fittable::Search(search) => {
                let mut search = search.clone_box();
                search.fit(x, y, options)?;
                search
                    .best_estimator()
                    .map(|best| best.clone_box())
                    .ok_or_else(|| {
                        ShapSelectError::TrainingError(
                            "Search finished without a best estimator".to_string(),
                        )
                    })
            }
        }
    }
}

/// Column 1 of `predict_proba`, the positive-class probability
pub fn positive_proba(model: &dyn Classifier, x: &Array2<f64>) -> Result<Array1<f64>> {
    let proba = model.predict_proba(x)?;
    if proba.ncols() != 2 || proba.nrows() != x.nrows() {
        return Err(ShapSelectError::ShapeError {
            expected: format!("({}, 2) probabilities", x.nrows()),
            actual: format!("{:?}", proba.dim()),
        });
    }
    Ok(proba.column(1).to_owned())
}

/// Stack positive-class probabilities into an `(n, 2)` matrix
pub(crate) fn binary_proba(p: &Array1<f64>) -> Array2<f64> {
    let mut out = Array2::zeros((p.len(), 2));
    for (i, &pi) in p.iter().enumerate() {
        out[[i, 0]] = 1.0 - pi;
        out[[i, 1]] = pi;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Predicts the training prevalence for every row
    #[derive(Debug, Clone, Default)]
    struct Prior {
        p: f64,
    }

    impl Classifier for Prior {
        fn name(&self) -> &str {
            "Prior"
        }

        fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>, _options: &FitOptions) -> Result<()> {
            self.p = y.mean().unwrap_or(0.5);
            Ok(())
        }

        fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
            Ok(binary_proba(&Array1::from_elem(x.nrows(), self.p)))
        }

        fn clone_box(&self) -> Box<dyn Classifier> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_fit_clone_leaves_original_unfitted() {
        let fittable = Fittable::estimator(Prior::default());
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 1.0, 1.0, 0.0];

        let fitted = fittable.fit_clone(&x, &y, &FitOptions::new()).unwrap();
        let p = positive_proba(fitted.as_ref(), &x).unwrap();
        assert!((p[0] - 0.75).abs() < 1e-12);

        match &fittable {
            Fittable::Estimator(model) => {
                let p0 = positive_proba(model.as_ref(), &x).unwrap();
                assert_eq!(p0[0], 0.0);
            }
            Fittable::Search(_) => unreachable!(),
        }
    }

    #[test]
    fn test_default_set_param_rejects() {
        let mut model = Prior::default();
        let err = model.set_param("alpha", &ParameterValue::Float(1.0)).unwrap_err();
        assert!(matches!(err, ShapSelectError::InvalidParameter { .. }));
        assert!(!model.supports_early_stopping());
    }

    #[test]
    fn test_default_predict_thresholds() {
        let model = Prior { p: 0.7 };
        let x = array![[0.0], [1.0]];
        assert_eq!(model.predict(&x).unwrap().to_vec(), vec![1.0, 1.0]);
    }
}
