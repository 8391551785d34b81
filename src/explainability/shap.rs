//! Model-agnostic SHAP values
//!
//! Interventional Shapley values of a classifier's predicted probabilities,
//! taken against a background sample drawn from the training rows. Small
//! feature sets are solved exactly by enumerating every coalition; larger
//! ones (or `approximate = true`) average marginal contributions over
//! sampled feature permutations.

use crate::error::{ShapSelectError, Result};
use crate::training::Classifier;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Options forwarded to the explainer on every call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapOptions {
    /// Trade exactness for speed
    pub approximate: bool,
    /// Verify `base + sum(phi) == f(x)` for every explained row
    pub check_additivity: bool,
}

impl Default for ShapOptions {
    fn default() -> Self {
        Self {
            approximate: false,
            check_additivity: true,
        }
    }
}

impl ShapOptions {
    pub fn approximate() -> Self {
        Self {
            approximate: true,
            ..Self::default()
        }
    }

    pub fn with_check_additivity(mut self, check: bool) -> Self {
        self.check_additivity = check;
        self
    }
}

/// Attribution matrices `[samples x features]`
#[derive(Debug, Clone, PartialEq)]
pub enum Attributions {
    /// One matrix for a single-output model
    Single(Array2<f64>),
    /// One matrix per predicted class, in class order
    PerClass(Vec<Array2<f64>>),
}

impl Attributions {
    pub fn n_outputs(&self) -> usize {
        match self {
            Attributions::Single(_) => 1,
            Attributions::PerClass(per_class) => per_class.len(),
        }
    }
}

/// Computes SHAP values of a fitted classifier
pub trait ShapExplainer: Send + Sync + fmt::Debug {
    /// Attributions for every row of `x`, with `background` standing in
    /// for the data distribution.
    fn shap_values(
        &self,
        model: &dyn Classifier,
        background: &Array2<f64>,
        x: &Array2<f64>,
        options: &ShapOptions,
    ) -> Result<Attributions>;

    /// Fix sampling randomness
    fn set_random_state(&mut self, _seed: u64) {}
}

/// Attributions together with the per-class expected value
#[derive(Debug, Clone)]
pub struct ShapExplanation {
    pub values: Attributions,
    pub base_values: Vec<f64>,
}

/// Largest `max_exact_features` accepted; exact mode evaluates
/// `2^p * background` rows per explained row
pub const MAX_EXACT_FEATURES: usize = 16;

/// Configuration for [`SamplingExplainer`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingExplainerConfig {
    /// Background rows kept after subsampling
    pub max_background: usize,
    /// Largest feature count solved by coalition enumeration, at most
    /// [`MAX_EXACT_FEATURES`]
    pub max_exact_features: usize,
    /// Permutations per row in sampling mode
    pub n_permutations: usize,
    /// Absolute additivity tolerance
    pub additivity_tolerance: f64,
    pub random_state: Option<u64>,
}

impl Default for SamplingExplainerConfig {
    fn default() -> Self {
        Self {
            max_background: 100,
            max_exact_features: 10,
            n_permutations: 10,
            additivity_tolerance: 1e-6,
            random_state: None,
        }
    }
}

impl SamplingExplainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_exact_features > MAX_EXACT_FEATURES {
            return Err(ShapSelectError::InvalidParameter {
                name: "max_exact_features".to_string(),
                value: self.max_exact_features.to_string(),
                reason: format!("must be at most {}", MAX_EXACT_FEATURES),
            });
        }
        if self.max_background == 0 {
            return Err(ShapSelectError::InvalidParameter {
                name: "max_background".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.additivity_tolerance >= 0.0) {
            return Err(ShapSelectError::InvalidParameter {
                name: "additivity_tolerance".to_string(),
                value: self.additivity_tolerance.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Interventional SHAP explainer for any [`Classifier`]
#[derive(Debug, Clone, Default)]
pub struct SamplingExplainer {
    config: SamplingExplainerConfig,
}

impl SamplingExplainer {
    pub fn new(config: SamplingExplainerConfig) -> Self {
        Self { config }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.random_state = Some(seed);
        self
    }

    pub fn config(&self) -> &SamplingExplainerConfig {
        &self.config
    }

    fn rng(&self, offset: u64) -> Xoshiro256PlusPlus {
        match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(offset)),
            None => Xoshiro256PlusPlus::from_entropy(),
        }
    }

    fn sample_background(&self, background: &Array2<f64>) -> Array2<f64> {
        if background.nrows() <= self.config.max_background {
            return background.to_owned();
        }
        let mut rng = self.rng(0);
        let mut rows = rand::seq::index::sample(
            &mut rng,
            background.nrows(),
            self.config.max_background,
        )
        .into_vec();
        rows.sort_unstable();
        background.select(Axis(0), &rows)
    }

    /// Explain every row of `x`
    pub fn explain(
        &self,
        model: &dyn Classifier,
        background: &Array2<f64>,
        x: &Array2<f64>,
        options: &ShapOptions,
    ) -> Result<ShapExplanation> {
        self.config.validate()?;
        let n_features = x.ncols();
        if background.ncols() != n_features {
            return Err(ShapSelectError::ShapeError {
                expected: format!("{} background features", n_features),
                actual: format!("{} background features", background.ncols()),
            });
        }
        if background.nrows() == 0 {
            return Err(ShapSelectError::ShapError(
                "Background data is empty".to_string(),
            ));
        }

        let background = self.sample_background(background);
        let base_proba = model.predict_proba(&background)?;
        let n_outputs = base_proba.ncols();
        let base_values: Vec<f64> = (0..n_outputs)
            .map(|k| base_proba.column(k).mean().unwrap_or(0.0))
            .collect();

        let exact = !options.approximate && n_features <= self.config.max_exact_features;
        let weights = if exact { shapley_weights(n_features) } else { Vec::new() };

        let per_row: Vec<Array2<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                if exact {
                    self.exact_row(model, &background, row, &weights, n_outputs)
                } else {
                    let mut rng = self.rng(i as u64 + 1);
                    self.permutation_row(model, &background, row, n_outputs, &mut rng)
                }
            })
            .collect::<Result<_>>()?;

        // per_row[i] is [outputs x features]
        let mut matrices = vec![Array2::<f64>::zeros((x.nrows(), n_features)); n_outputs];
        for (i, phi) in per_row.iter().enumerate() {
            for (k, matrix) in matrices.iter_mut().enumerate() {
                matrix.row_mut(i).assign(&phi.row(k));
            }
        }

        if options.check_additivity && x.nrows() > 0 {
            let prediction = model.predict_proba(x)?;
            for (k, matrix) in matrices.iter().enumerate() {
                for i in 0..x.nrows() {
                    let reconstructed = base_values[k] + matrix.row(i).sum();
                    let diff = (reconstructed - prediction[[i, k]]).abs();
                    if diff > self.config.additivity_tolerance {
                        return Err(ShapSelectError::ShapError(format!(
                            "Additivity check failed for row {} output {}: base + sum(shap) = {:.8}, \
                             model output = {:.8}",
                            i, k, reconstructed, prediction[[i, k]]
                        )));
                    }
                }
            }
        }

        let values = if n_outputs == 1 {
            Attributions::Single(matrices.remove(0))
        } else {
            Attributions::PerClass(matrices)
        };

        Ok(ShapExplanation { values, base_values })
    }

    /// Mean model output over the background with the masked features
    /// taken from `row`, one block of background rows per coalition.
    fn coalition_values(
        model: &dyn Classifier,
        background: &Array2<f64>,
        row: ArrayView1<f64>,
        coalitions: &[Vec<bool>],
        n_outputs: usize,
    ) -> Result<Array2<f64>> {
        let n_bg = background.nrows();
        let mut batch = Array2::zeros((coalitions.len() * n_bg, row.len()));

        for (c, mask) in coalitions.iter().enumerate() {
            let mut block = batch.slice_mut(s![c * n_bg..(c + 1) * n_bg, ..]);
            block.assign(background);
            for (j, &present) in mask.iter().enumerate() {
                if present {
                    block.column_mut(j).fill(row[j]);
                }
            }
        }

        let proba = model.predict_proba(&batch)?;
        if proba.ncols() != n_outputs {
            return Err(ShapSelectError::ShapError(format!(
                "Model returned {} outputs, expected {}",
                proba.ncols(),
                n_outputs
            )));
        }

        let mut values = Array2::zeros((coalitions.len(), n_outputs));
        for c in 0..coalitions.len() {
            let block = proba.slice(s![c * n_bg..(c + 1) * n_bg, ..]);
            if let Some(mean) = block.mean_axis(Axis(0)) {
                values.row_mut(c).assign(&mean);
            }
        }
        Ok(values)
    }

    fn exact_row(
        &self,
        model: &dyn Classifier,
        background: &Array2<f64>,
        row: ArrayView1<f64>,
        weights: &[f64],
        n_outputs: usize,
    ) -> Result<Array2<f64>> {
        let p = row.len();
        let n_coalitions = 1usize << p;
        let coalitions: Vec<Vec<bool>> = (0..n_coalitions)
            .map(|mask| (0..p).map(|j| mask & (1 << j) != 0).collect())
            .collect();

        let values = Self::coalition_values(model, background, row, &coalitions, n_outputs)?;

        let mut phi = Array2::zeros((n_outputs, p));
        for mask in 0..n_coalitions {
            let size = mask.count_ones() as usize;
            for j in 0..p {
                if mask & (1 << j) != 0 {
                    continue;
                }
                let with_j = mask | (1 << j);
                for k in 0..n_outputs {
                    phi[[k, j]] += weights[size] * (values[[with_j, k]] - values[[mask, k]]);
                }
            }
        }
        Ok(phi)
    }

    fn permutation_row(
        &self,
        model: &dyn Classifier,
        background: &Array2<f64>,
        row: ArrayView1<f64>,
        n_outputs: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Result<Array2<f64>> {
        let p = row.len();
        let n_permutations = self.config.n_permutations.max(1);
        let mut phi = Array2::zeros((n_outputs, p));

        for _ in 0..n_permutations {
            let mut order: Vec<usize> = (0..p).collect();
            order.shuffle(rng);

            // Coalitions along the permutation: {}, {o0}, {o0, o1}, ...
            let mut coalitions = Vec::with_capacity(p + 1);
            let mut mask = vec![false; p];
            coalitions.push(mask.clone());
            for &j in &order {
                mask[j] = true;
                coalitions.push(mask.clone());
            }

            let values = Self::coalition_values(model, background, row, &coalitions, n_outputs)?;
            for (step, &j) in order.iter().enumerate() {
                for k in 0..n_outputs {
                    phi[[k, j]] += values[[step + 1, k]] - values[[step, k]];
                }
            }
        }

        phi.mapv_inplace(|v| v / n_permutations as f64);
        Ok(phi)
    }
}

impl ShapExplainer for SamplingExplainer {
    fn shap_values(
        &self,
        model: &dyn Classifier,
        background: &Array2<f64>,
        x: &Array2<f64>,
        options: &ShapOptions,
    ) -> Result<Attributions> {
        Ok(self.explain(model, background, x, options)?.values)
    }

    fn set_random_state(&mut self, seed: u64) {
        self.config.random_state = Some(seed);
    }
}

/// `|S|! (p - |S| - 1)! / p!` indexed by coalition size
fn shapley_weights(p: usize) -> Vec<f64> {
    if p == 0 {
        return Vec::new();
    }
    let factorial = |n: usize| (1..=n).fold(1.0, |acc, v| acc * v as f64);
    let total = factorial(p);
    (0..p)
        .map(|size| factorial(size) * factorial(p - size - 1) / total)
        .collect()
}

/// Column-wise mean absolute value, the global importance of each feature
pub fn mean_abs_shap(values: &Array2<f64>) -> Array1<f64> {
    values
        .mapv(f64::abs)
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(values.ncols()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{DecisionTreeClassifier, FitOptions, LogisticRegression};
    use ndarray::array;

    fn stump_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 0.5, 0.0],
            [1.0, 0.5, 1.0],
            [1.0, 0.5, 0.0],
            [1.0, 0.6, 1.0],
            [1.0, 0.5, 0.0],
            [1.0, 0.5, 1.0],
        ];
        let y = array![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_exact_values_concentrate_on_signal() {
        let (x, y) = stump_data();
        let mut model = DecisionTreeClassifier::new().with_max_depth(1);
        model.fit(&x, &y, &FitOptions::new()).unwrap();

        let explainer = SamplingExplainer::default().with_seed(0);
        let explanation = explainer.explain(&model, &x, &x, &ShapOptions::default()).unwrap();

        let Attributions::PerClass(per_class) = &explanation.values else {
            panic!("expected per-class attributions");
        };
        assert_eq!(per_class.len(), 2);
        let positive = &per_class[1];
        assert_eq!(positive.dim(), (6, 3));

        // Only the third column moves the prediction
        let importance = mean_abs_shap(positive);
        assert!((importance[2] - 0.5).abs() < 1e-9);
        assert_eq!(importance[0], 0.0);
        assert_eq!(importance[1], 0.0);
        assert!((explanation.base_values[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_permutation_mode_is_additive() {
        let x = array![
            [0.1, 2.0, -1.0, 0.3],
            [0.9, 1.0, 0.5, 0.1],
            [0.4, 0.0, 0.2, 0.8],
            [0.7, 3.0, -0.4, 0.6],
        ];
        let y = array![0.0, 1.0, 0.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y, &FitOptions::new()).unwrap();

        let explainer = SamplingExplainer::default().with_seed(11);
        let values = explainer
            .shap_values(&model, &x, &x, &ShapOptions::approximate())
            .unwrap();
        assert_eq!(values.n_outputs(), 2);
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let (x, y) = stump_data();
        let mut model = LogisticRegression::new();
        model.fit(&x, &y, &FitOptions::new()).unwrap();

        let explainer = SamplingExplainer::default().with_seed(5);
        let a = explainer.shap_values(&model, &x, &x, &ShapOptions::approximate()).unwrap();
        let b = explainer.shap_values(&model, &x, &x, &ShapOptions::approximate()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shapley_weights_sum_per_feature() {
        // sum over subsets of N \ {i}: C(p-1, s) * w(s) == 1
        let p = 4;
        let w = shapley_weights(p);
        let binom = [1.0, 3.0, 3.0, 1.0];
        let total: f64 = (0..p).map(|s| binom[s] * w[s]).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_exact_feature_limit() {
        let (x, y) = stump_data();
        let mut model = DecisionTreeClassifier::new().with_max_depth(1);
        model.fit(&x, &y, &FitOptions::new()).unwrap();

        let explainer = SamplingExplainer::new(SamplingExplainerConfig {
            max_exact_features: 64,
            ..SamplingExplainerConfig::default()
        });
        assert!(matches!(
            explainer.shap_values(&model, &x, &x, &ShapOptions::default()),
            Err(ShapSelectError::InvalidParameter { .. })
        ));

        let at_limit = SamplingExplainerConfig {
            max_exact_features: MAX_EXACT_FEATURES,
            ..SamplingExplainerConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_background_feature_mismatch() {
        let (x, y) = stump_data();
        let mut model = DecisionTreeClassifier::new();
        model.fit(&x, &y, &FitOptions::new()).unwrap();

        let explainer = SamplingExplainer::default();
        let background = Array2::zeros((2, 2));
        assert!(explainer
            .shap_values(&model, &background, &x, &ShapOptions::default())
            .is_err());
    }
}
