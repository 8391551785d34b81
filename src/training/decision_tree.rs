//! Decision tree implementation
//!
//! A binary CART tree used directly as a classifier and as the weak learner
//! of gradient boosting. Leaves store the mean target of their samples, which
//! for `{0, 1}` labels is the positive-class frequency.

use super::models::{binary_proba, Classifier, FitOptions};
use crate::error::{ShapSelectError, Result};
use crate::optimizer::ParameterValue;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

impl Criterion {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gini" => Some(Criterion::Gini),
            "entropy" | "log_loss" => Some(Criterion::Entropy),
            "mse" | "squared_error" => Some(Criterion::MSE),
            _ => None,
        }
    }

    /// Impurity of a node from its sample count, target sum and squared sum
    fn impurity(&self, count: usize, sum: f64, sq_sum: f64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        let n = count as f64;
        match self {
            Criterion::Gini => {
                let p = sum / n;
                1.0 - p * p - (1.0 - p) * (1.0 - p)
            }
            Criterion::Entropy => {
                let p = sum / n;
                let mut entropy = 0.0;
                for q in [p, 1.0 - p] {
                    if q > 0.0 {
                        entropy -= q * q.ln();
                    }
                }
                entropy
            }
            Criterion::MSE => (sq_sum / n - (sum / n).powi(2)).max(0.0),
        }
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Number of features seen during fit
    n_features: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            n_features: 0,
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();

        if n_samples != y.len() {
            return Err(ShapSelectError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(ShapSelectError::TrainingError(
                "Cannot fit a tree on zero samples".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ShapSelectError::InvalidParameter {
                name: "min_samples_split".to_string(),
                value: self.min_samples_split.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(ShapSelectError::InvalidParameter {
                name: "min_samples_leaf".to_string(),
                value: self.min_samples_leaf.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        self.n_features = x.ncols();
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0));

        Ok(self)
    }

    fn build_tree(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize], depth: usize) -> TreeNode {
        let n_samples = indices.len();
        let sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let sq_sum: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let leaf = TreeNode::Leaf {
            value: sum / n_samples as f64,
            n_samples,
        };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || self.criterion.impurity(n_samples, sum, sq_sum) <= 1e-12;

        if should_stop {
            return leaf;
        }

        let Some((feature_idx, threshold)) = self.find_best_split(x, y, indices, sum, sq_sum) else {
            return leaf;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature_idx]] <= threshold);

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
        }
    }

    /// Best (feature, threshold) by impurity decrease. Ties go to the lower
    /// feature index so fitting is deterministic.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        total_sum: f64,
        total_sq_sum: f64,
    ) -> Option<(usize, f64)> {
        let n = indices.len();
        let parent_impurity = self.criterion.impurity(n, total_sum, total_sq_sum);

        // Each feature independently sweeps its sorted values
        let feature_results: Vec<Option<(usize, f64, f64)>> = (0..x.ncols())
            .into_par_iter()
            .map(|feature_idx| {
                let mut order: Vec<usize> = indices.to_vec();
                order.sort_by(|&a, &b| {
                    x[[a, feature_idx]]
                        .partial_cmp(&x[[b, feature_idx]])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

                let mut best: Option<(f64, f64)> = None;
                let mut left_sum = 0.0;
                let mut left_sq_sum = 0.0;

                for pos in 0..n - 1 {
                    let yi = y[order[pos]];
                    left_sum += yi;
                    left_sq_sum += yi * yi;

                    let current = x[[order[pos], feature_idx]];
                    let next = x[[order[pos + 1], feature_idx]];
                    if next <= current {
                        continue;
                    }

                    let left_count = pos + 1;
                    let right_count = n - left_count;
                    if left_count < self.min_samples_leaf || right_count < self.min_samples_leaf {
                        continue;
                    }

                    let left_impurity = self.criterion.impurity(left_count, left_sum, left_sq_sum);
                    let right_impurity = self.criterion.impurity(
                        right_count,
                        total_sum - left_sum,
                        total_sq_sum - left_sq_sum,
                    );
                    let weighted = (left_count as f64 * left_impurity
                        + right_count as f64 * right_impurity)
                        / n as f64;
                    let gain = parent_impurity - weighted;

                    if gain > 1e-12 && best.map_or(true, |(g, _)| gain > g) {
                        best = Some((gain, (current + next) / 2.0));
                    }
                }

                best.map(|(gain, threshold)| (feature_idx, threshold, gain))
            })
            .collect();

        feature_results
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<(usize, f64, f64)>, cand| match acc {
                Some(a) if a.2 >= cand.2 => Some(a),
                _ => Some(cand),
            })
            .map(|(feature_idx, threshold, _)| (feature_idx, threshold))
    }

    /// Predict leaf values
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ShapSelectError::ModelNotFitted)?;

        if x.ncols() != self.n_features {
            return Err(ShapSelectError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows().into_iter().map(|row| Self::predict_sample(root, row)).collect())
    }

    fn predict_sample(node: &TreeNode, sample: ArrayView1<f64>) -> f64 {
        match node {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                if sample[*feature_idx] <= *threshold {
                    Self::predict_sample(left, sample)
                } else {
                    Self::predict_sample(right, sample)
                }
            }
        }
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }
}

/// CART classifier over `{0, 1}` labels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    tree: DecisionTree,
}

impl DecisionTreeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.tree.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.tree.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.tree.min_samples_leaf = min_samples;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.tree.criterion = criterion;
        self
    }

    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }
}

impl Classifier for DecisionTreeClassifier {
    fn name(&self) -> &str {
        "DecisionTreeClassifier"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, _options: &FitOptions) -> Result<()> {
        self.tree.fit(x, y)?;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(binary_proba(&self.tree.predict(x)?))
    }

    fn set_param(&mut self, name: &str, value: &ParameterValue) -> Result<()> {
        let invalid = |reason: &str| ShapSelectError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match name {
            "criterion" => {
                let criterion = value
                    .as_string()
                    .and_then(Criterion::parse)
                    .filter(|c| *c != Criterion::MSE)
                    .ok_or_else(|| invalid("expected 'gini' or 'entropy'"))?;
                self.tree.criterion = criterion;
            }
            "max_depth" => {
                self.tree.max_depth = if value.is_none() {
                    None
                } else {
                    Some(value.as_usize().ok_or_else(|| invalid("expected a non-negative integer"))?)
                };
            }
            "min_samples_split" => {
                self.tree.min_samples_split =
                    value.as_usize().ok_or_else(|| invalid("expected a non-negative integer"))?;
            }
            "min_samples_leaf" => {
                self.tree.min_samples_leaf =
                    value.as_usize().ok_or_else(|| invalid("expected a non-negative integer"))?;
            }
            _ => return Err(invalid("unknown parameter for DecisionTreeClassifier")),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}
