//! Named scorers and the metric functions behind them

use crate::error::{ShapSelectError, Result};
use crate::training::{positive_proba, Classifier};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric computed by a [`Scorer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScorerKind {
    RocAuc,
    Accuracy,
    Precision,
    Recall,
    F1,
    NegLogLoss,
    NegBrierScore,
}

impl ScorerKind {
    /// Canonical scorer name
    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerKind::RocAuc => "roc_auc",
            ScorerKind::Accuracy => "accuracy",
            ScorerKind::Precision => "precision",
            ScorerKind::Recall => "recall",
            ScorerKind::F1 => "f1",
            ScorerKind::NegLogLoss => "neg_log_loss",
            ScorerKind::NegBrierScore => "neg_brier_score",
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scores a fitted classifier on `(x, y)`; greater is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scorer {
    kind: ScorerKind,
}

impl Scorer {
    pub fn new(kind: ScorerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ScorerKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Score `model` on `x` against labels `y`
    pub fn score(&self, model: &dyn Classifier, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        if x.nrows() != y.len() {
            return Err(ShapSelectError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        let proba = positive_proba(model, x)?;
        self.score_proba(y, &proba)
    }

    /// Score positive-class probabilities against labels
    pub fn score_proba(&self, y: &Array1<f64>, proba: &Array1<f64>) -> Result<f64> {
        if y.is_empty() {
            return Err(ShapSelectError::ScoringError(format!(
                "Cannot compute {} on zero samples",
                self.name()
            )));
        }
        let predicted = || proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 });

        match self.kind {
            ScorerKind::RocAuc => roc_auc_score(y, proba),
            ScorerKind::Accuracy => Ok(accuracy_score(y, &predicted())),
            ScorerKind::Precision => Ok(precision_score(y, &predicted())),
            ScorerKind::Recall => Ok(recall_score(y, &predicted())),
            ScorerKind::F1 => Ok(f1_score(y, &predicted())),
            ScorerKind::NegLogLoss => Ok(-log_loss(y, proba)),
            ScorerKind::NegBrierScore => Ok(-brier_score(y, proba)),
        }
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScorerKind::RocAuc)
    }
}

/// Resolve a scorer by name
pub fn get_scorer(name: &str) -> Result<Scorer> {
    let kind = match name {
        "roc_auc" | "auc" => ScorerKind::RocAuc,
        "accuracy" => ScorerKind::Accuracy,
        "precision" => ScorerKind::Precision,
        "recall" => ScorerKind::Recall,
        "f1" => ScorerKind::F1,
        "neg_log_loss" => ScorerKind::NegLogLoss,
        "neg_brier_score" => ScorerKind::NegBrierScore,
        other => {
            return Err(ShapSelectError::ConfigError(format!(
                "Unknown scoring metric '{}'; expected one of roc_auc, accuracy, precision, \
                 recall, f1, neg_log_loss, neg_brier_score",
                other
            )))
        }
    };
    Ok(Scorer::new(kind))
}

/// Area under the ROC curve, with tied scores given their average rank
pub fn roc_auc_score(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64> {
    if y_true.len() != y_score.len() {
        return Err(ShapSelectError::ShapeError {
            expected: format!("{} scores", y_true.len()),
            actual: format!("{} scores", y_score.len()),
        });
    }

    let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(ShapSelectError::ScoringError(
            "Only one class present in y_true; ROC AUC is undefined".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut ranks = vec![0.0; order.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && y_score[order[end]] == y_score[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; a tie group shares the mean of its ranks
        let avg_rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg_rank;
        }
        start = end;
    }

    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|(&t, _)| t > 0.5)
        .map(|(_, &r)| r)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// `(tp, fp, tn, fn)` for thresholded predictions
pub fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (usize, usize, usize, usize) {
    let mut tp = 0;
    let mut fp = 0;
    let mut tn = 0;
    let mut fn_ = 0;

    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        match (*t > 0.5, *p > 0.5) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }

    (tp, fp, tn, fn_)
}

pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Precision, 0 when nothing is predicted positive
pub fn precision_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let (tp, fp, _, _) = confusion_counts(y_true, y_pred);
    if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    }
}

/// Recall, 0 when there are no positives
pub fn recall_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let (tp, _, _, fn_) = confusion_counts(y_true, y_pred);
    if tp + fn_ > 0 {
        tp as f64 / (tp + fn_) as f64
    } else {
        0.0
    }
}

pub fn f1_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let p = precision_score(y_true, y_pred);
    let r = recall_score(y_true, y_pred);
    if p + r > 0.0 {
        2.0 * p * r / (p + r)
    } else {
        0.0
    }
}

/// Mean binary cross-entropy with probabilities clipped to `[1e-15, 1 - 1e-15]`
pub fn log_loss(y_true: &Array1<f64>, proba: &Array1<f64>) -> f64 {
    let eps = 1e-15;
    let total: f64 = y_true
        .iter()
        .zip(proba.iter())
        .map(|(&t, &p)| {
            let p = p.clamp(eps, 1.0 - eps);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum();
    total / y_true.len() as f64
}

pub fn brier_score(y_true: &Array1<f64>, proba: &Array1<f64>) -> f64 {
    let total: f64 = y_true
        .iter()
        .zip(proba.iter())
        .map(|(&t, &p)| (p - t).powi(2))
        .sum();
    total / y_true.len() as f64
}
