//! Elimination configuration

use crate::error::{ShapSelectError, Result};
use crate::metrics::get_scorer;
use crate::training::EvalMetric;
use serde::{Deserialize, Serialize};

/// Features removed per round: a count, or a fraction of the active set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Count(usize),
    Fraction(f64),
}

impl Default for Step {
    fn default() -> Self {
        Step::Count(1)
    }
}

impl From<usize> for Step {
    fn from(n: usize) -> Self {
        Step::Count(n)
    }
}

impl From<f64> for Step {
    fn from(f: f64) -> Self {
        Step::Fraction(f)
    }
}

impl Step {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Step::Count(n) if n >= 1 => Ok(()),
            Step::Fraction(f) if f > 0.0 && f < 1.0 => Ok(()),
            Step::Count(n) => Err(ShapSelectError::InvalidParameter {
                name: "step".to_string(),
                value: n.to_string(),
                reason: "an integer step must be at least 1".to_string(),
            }),
            Step::Fraction(f) => Err(ShapSelectError::InvalidParameter {
                name: "step".to_string(),
                value: f.to_string(),
                reason: "a fractional step must lie in (0, 1)".to_string(),
            }),
        }
    }
}

/// Configuration of a SHAP recursive elimination run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationConfig {
    /// Removal quantity per round
    pub step: Step,
    /// Number of stratified folds
    pub cv: usize,
    /// Scorer name
    pub scoring: String,
    /// Smallest feature count evaluated
    pub min_features_to_select: usize,
    /// Fold workers, `None` for all cores
    pub n_jobs: Option<usize>,
    /// Seed for folds, models, monitor splits and SHAP sampling
    pub random_state: Option<u64>,
    /// Log one line per round at info level
    pub verbose: bool,
}

impl Default for EliminationConfig {
    fn default() -> Self {
        Self {
            step: Step::Count(1),
            cv: 5,
            scoring: "roc_auc".to_string(),
            min_features_to_select: 1,
            n_jobs: None,
            random_state: None,
            verbose: false,
        }
    }
}

impl EliminationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: impl Into<Step>) -> Self {
        self.step = step.into();
        self
    }

    pub fn with_cv(mut self, cv: usize) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_scoring(mut self, scoring: impl Into<String>) -> Self {
        self.scoring = scoring.into();
        self
    }

    pub fn with_min_features_to_select(mut self, n: usize) -> Self {
        self.min_features_to_select = n;
        self
    }

    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = Some(n);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check every option that does not depend on the data
    pub fn validate(&self) -> Result<()> {
        self.step.validate()?;
        if self.cv < 2 {
            return Err(ShapSelectError::ConfigError(format!(
                "cv must be at least 2, got {}",
                self.cv
            )));
        }
        if self.min_features_to_select == 0 {
            return Err(ShapSelectError::ConfigError(
                "min_features_to_select must be at least 1".to_string(),
            ));
        }
        if self.n_jobs == Some(0) {
            return Err(ShapSelectError::ConfigError(
                "n_jobs must be at least 1 when set".to_string(),
            ));
        }
        get_scorer(&self.scoring)?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save the configuration to a JSON file
    pub fn save(&self, path: &str) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Extra options of the early-stopping variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    /// Rounds without improvement before training stops
    pub early_stopping_rounds: usize,
    /// Metric monitored on the held-out slice
    pub eval_metric: String,
    /// Share of each training fold held out for monitoring
    pub monitor_fraction: f64,
    /// Keep class proportions in the monitor slice
    pub stratify_monitor: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            early_stopping_rounds: 5,
            eval_metric: "auc".to_string(),
            monitor_fraction: 0.2,
            stratify_monitor: true,
        }
    }
}

impl EarlyStoppingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_early_stopping_rounds(mut self, rounds: usize) -> Self {
        self.early_stopping_rounds = rounds;
        self
    }

    pub fn with_eval_metric(mut self, metric: impl Into<String>) -> Self {
        self.eval_metric = metric.into();
        self
    }

    pub fn with_monitor_fraction(mut self, fraction: f64) -> Self {
        self.monitor_fraction = fraction;
        self
    }

    pub fn with_stratify_monitor(mut self, stratify: bool) -> Self {
        self.stratify_monitor = stratify;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.early_stopping_rounds == 0 {
            return Err(ShapSelectError::ConfigError(
                "early_stopping_rounds must be at least 1".to_string(),
            ));
        }
        if !(self.monitor_fraction > 0.0 && self.monitor_fraction < 1.0) {
            return Err(ShapSelectError::ConfigError(format!(
                "monitor_fraction must lie in (0, 1), got {}",
                self.monitor_fraction
            )));
        }
        EvalMetric::parse(&self.eval_metric)
            .map_err(|e| ShapSelectError::ConfigError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EliminationConfig::default().validate().is_ok());
        assert!(EarlyStoppingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_options() {
        assert!(EliminationConfig::new().with_step(0usize).validate().is_err());
        assert!(EliminationConfig::new().with_step(1.0).validate().is_err());
        assert!(EliminationConfig::new().with_cv(1).validate().is_err());
        assert!(EliminationConfig::new().with_scoring("r2").validate().is_err());
        assert!(EliminationConfig::new().with_min_features_to_select(0).validate().is_err());
        assert!(EarlyStoppingConfig::new().with_eval_metric("map").validate().is_err());
        assert!(EarlyStoppingConfig::new().with_monitor_fraction(0.0).validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_step_kind() {
        let config = EliminationConfig::new().with_step(0.8).with_random_state(1);
        let parsed = EliminationConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);

        let parsed = EliminationConfig::from_json(
            r#"{"step": 2, "cv": 3, "scoring": "f1", "min_features_to_select": 1,
                "n_jobs": null, "random_state": 7, "verbose": false}"#,
        )
        .unwrap();
        assert_eq!(parsed.step, Step::Count(2));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elimination.json");
        let path = path.to_str().unwrap();

        let config = EliminationConfig::new().with_cv(3).with_scoring("accuracy");
        config.save(path).unwrap();
        assert_eq!(EliminationConfig::load(path).unwrap(), config);
    }
}
