//! Cross-validation implementations

use crate::error::{ShapSelectError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 5, shuffle: true }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                self.k_fold_split(n_samples, *n_splits, *shuffle)
            }
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| ShapSelectError::ValidationError(
                    "StratifiedKFold requires target array".to_string()
                ))?;
                if y.len() != n_samples {
                    return Err(ShapSelectError::ShapeError {
                        expected: format!("{} labels", n_samples),
                        actual: format!("{} labels", y.len()),
                    });
                }
                self.stratified_k_fold_split(y, *n_splits, *shuffle)
            }
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn check_n_splits(n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(ShapSelectError::ValidationError(
                "n_splits must be at least 2".to_string()
            ));
        }
        if n_samples < n_splits {
            return Err(ShapSelectError::ValidationError(
                format!("n_samples ({}) must be >= n_splits ({})", n_samples, n_splits)
            ));
        }
        Ok(())
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        Self::check_n_splits(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();

        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;

        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let mut test_indices: Vec<usize> = indices[current..current + fold_size].to_vec();
            let mut train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();
            test_indices.sort_unstable();
            train_indices.sort_unstable();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });

            current += fold_size;
        }

        Ok(splits)
    }

    fn stratified_k_fold_split(
        &self,
        y: &Array1<f64>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CVSplit>> {
        Self::check_n_splits(y.len(), n_splits)?;

        // Ordered by class so fold assignment does not depend on hashing
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        for (class, indices) in &class_indices {
            if indices.len() < n_splits {
                warn!(
                    class,
                    members = indices.len(),
                    n_splits,
                    "Least populated class has fewer members than n_splits"
                );
            }
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Each class continues where the previous one stopped, keeping fold sizes balanced
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut offset = 0;
        for indices in class_indices.values() {
            for (i, &idx) in indices.iter().enumerate() {
                folds[(offset + i) % n_splits].push(idx);
            }
            offset += indices.len();
        }

        let mut splits = Vec::with_capacity(n_splits);
        for fold_idx in 0..n_splits {
            let mut test_indices = folds[fold_idx].clone();
            let mut train_indices: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            test_indices.sort_unstable();
            train_indices.sort_unstable();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
        }

        Ok(splits)
    }
}

/// Split `positions` into `(fit, held_out)` with roughly `test_fraction`
/// of them held out.
///
/// Labels are looked up as `y[position]`. With `stratify` each class
/// contributes proportionally and a class is never moved entirely into
/// the held-out part. Both outputs are sorted.
pub fn train_test_split(
    positions: &[usize],
    y: &Array1<f64>,
    test_fraction: f64,
    stratify: bool,
    random_state: Option<u64>,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ShapSelectError::InvalidParameter {
            name: "test_fraction".to_string(),
            value: test_fraction.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }
    if positions.len() < 2 {
        return Err(ShapSelectError::ValidationError(format!(
            "Cannot split {} samples into two non-empty parts",
            positions.len()
        )));
    }
    if let Some(&bad) = positions.iter().find(|&&p| p >= y.len()) {
        return Err(ShapSelectError::ValidationError(format!(
            "Position {} out of range for {} labels",
            bad,
            y.len()
        )));
    }

    let mut rng = match random_state {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let mut fit = Vec::with_capacity(positions.len());
    let mut held_out = Vec::new();

    if stratify {
        let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for &p in positions {
            by_class.entry(y[p].round() as i64).or_default().push(p);
        }
        for mut members in by_class.into_values() {
            members.shuffle(&mut rng);
            let n_test = ((members.len() as f64) * test_fraction).round() as usize;
            let n_test = n_test.min(members.len().saturating_sub(1));
            held_out.extend_from_slice(&members[..n_test]);
            fit.extend_from_slice(&members[n_test..]);
        }
    } else {
        let mut shuffled = positions.to_vec();
        shuffled.shuffle(&mut rng);
        let n_test = ((shuffled.len() as f64) * test_fraction).round() as usize;
        let n_test = n_test.clamp(1, shuffled.len() - 1);
        held_out.extend_from_slice(&shuffled[..n_test]);
        fit.extend_from_slice(&shuffled[n_test..]);
    }

    if held_out.is_empty() {
        return Err(ShapSelectError::ValidationError(format!(
            "Held-out fraction {} of {} samples is empty",
            test_fraction,
            positions.len()
        )));
    }

    fit.sort_unstable();
    held_out.sort_unstable();
    Ok((fit, held_out))
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Population standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self {
                scores,
                mean_score: f64::NAN,
                std_score: f64::NAN,
                n_folds,
            };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        let std_score = variance.sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 5);

        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_k_fold() {
        let y = Array1::from_vec(vec![
            0.0, 0.0, 0.0, 0.0, 0.0,
            1.0, 1.0, 1.0, 1.0, 1.0,
        ]);

        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5, shuffle: false });
        let splits = cv.split(10, Some(&y)).unwrap();

        assert_eq!(splits.len(), 5);

        // One sample of each class per fold
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(positives, 1);
        }
    }

    #[test]
    fn test_stratified_balances_odd_classes() {
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 2, shuffle: false });
        let splits = cv.split(6, Some(&y)).unwrap();

        assert_eq!(splits[0].test_indices.len(), 3);
        assert_eq!(splits[1].test_indices.len(), 3);
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let y = Array1::from_vec((0..40).map(|i| (i % 2) as f64).collect());
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true })
            .with_random_state(7);

        assert_eq!(cv.split(40, Some(&y)).unwrap(), cv.split(40, Some(&y)).unwrap());
    }

    #[test]
    fn test_too_few_samples() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        assert!(cv.split(3, None).is_err());
    }

    #[test]
    fn test_train_test_split_stratified() {
        let y = Array1::from_vec((0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect());
        let positions: Vec<usize> = (0..20).collect();

        let (fit, held_out) = train_test_split(&positions, &y, 0.2, true, Some(1)).unwrap();

        assert_eq!(held_out.len(), 4);
        assert_eq!(fit.len(), 16);
        assert_eq!(held_out.iter().filter(|&&p| y[p] == 1.0).count(), 2);
        assert!(held_out.iter().all(|p| !fit.contains(p)));
    }

    #[test]
    fn test_train_test_split_invalid_fraction() {
        let y = Array1::from_vec(vec![0.0, 1.0]);
        assert!(train_test_split(&[0, 1], &y, 1.5, false, None).is_err());
    }

    #[test]
    fn test_cv_results_population_std() {
        let results = CVResults::from_scores(vec![1.0, 3.0]);
        assert_eq!(results.mean_score, 2.0);
        assert_eq!(results.std_score, 1.0);
    }
}
