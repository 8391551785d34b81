//! Elimination trace and feature selection

use crate::error::{ShapSelectError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Everything measured in one elimination round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number
    pub round: usize,
    pub num_features: usize,
    /// Active features at the start of the round, in column order
    pub features_set: Vec<String>,
    /// Mean over folds of each feature's mean |SHAP|, aligned with `features_set`
    pub shap_importance_mean: Vec<f64>,
    pub shap_importance_std: Vec<f64>,
    pub train_metric_mean: f64,
    pub train_metric_std: f64,
    pub val_metric_mean: f64,
    pub val_metric_std: f64,
    pub num_eliminated: usize,
    pub eliminated_features: Vec<String>,
}

impl RoundRecord {
    /// Mean importance of `feature`, if it was active this round
    pub fn importance_of(&self, feature: &str) -> Option<f64> {
        self.features_set
            .iter()
            .position(|f| f == feature)
            .map(|i| self.shap_importance_mean[i])
    }
}

/// The elimination trace, one record per round in round order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EliminationReport {
    scoring: String,
    records: Vec<RoundRecord>,
}

impl EliminationReport {
    pub fn new(scoring: impl Into<String>, records: Vec<RoundRecord>) -> Self {
        Self {
            scoring: scoring.into(),
            records,
        }
    }

    /// Scorer used for the train/validation columns
    pub fn scoring(&self) -> &str {
        &self.scoring
    }

    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Feature counts of every round, decreasing
    pub fn num_features(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.num_features).collect()
    }

    /// Features of the round that evaluated exactly `num_features` features
    pub fn select(&self, num_features: usize) -> Result<Vec<String>> {
        self.records
            .iter()
            .find(|r| r.num_features == num_features)
            .map(|r| r.features_set.clone())
            .ok_or_else(|| ShapSelectError::InvalidSelection {
                requested: num_features,
                available: self.num_features(),
            })
    }

    /// Round with the highest mean validation score, preferring fewer features on ties
    pub fn best_round(&self) -> Option<&RoundRecord> {
        self.records.iter().fold(None, |best: Option<&RoundRecord>, r| match best {
            Some(b) if b.val_metric_mean > r.val_metric_mean => Some(b),
            _ => Some(r),
        })
    }

    /// Trace as a table, one row per round
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let list_column = |name: &str, lists: Vec<Series>| -> Column {
            Series::new(name.into(), lists).into()
        };

        let features_set: Vec<Series> = self
            .records
            .iter()
            .map(|r| Series::new("".into(), r.features_set.clone()))
            .collect();
        let eliminated: Vec<Series> = self
            .records
            .iter()
            .map(|r| Series::new("".into(), r.eliminated_features.clone()))
            .collect();

        let df = DataFrame::new(vec![
            Series::new(
                "round".into(),
                self.records.iter().map(|r| r.round as u32).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "num_features".into(),
                self.records.iter().map(|r| r.num_features as u32).collect::<Vec<_>>(),
            )
            .into(),
            list_column("features_set", features_set),
            list_column("eliminated_features", eliminated),
            Series::new(
                "train_metric_mean".into(),
                self.records.iter().map(|r| r.train_metric_mean).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "train_metric_std".into(),
                self.records.iter().map(|r| r.train_metric_std).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "val_metric_mean".into(),
                self.records.iter().map(|r| r.val_metric_mean).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "val_metric_std".into(),
                self.records.iter().map(|r| r.val_metric_std).collect::<Vec<_>>(),
            )
            .into(),
        ])?;

        Ok(df)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
