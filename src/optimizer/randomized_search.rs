//! Randomized hyperparameter search with inner cross-validation

use super::search_space::{SearchSpace, TrialParams};
use crate::error::{ShapSelectError, Result};
use crate::metrics::get_scorer;
use crate::training::{
    CVResults, CVStrategy, Classifier, CrossValidator, FitOptions, HyperparameterSearch,
};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Configuration for [`RandomizedSearchCv`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomizedSearchConfig {
    /// Number of candidates to evaluate
    pub n_iter: usize,
    /// Inner cross-validation folds
    pub cv: usize,
    /// Scorer name, greater is better
    pub scoring: String,
    /// Random seed for sampling and inner folds
    pub random_state: Option<u64>,
}

impl Default for RandomizedSearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 10,
            cv: 3,
            scoring: "roc_auc".to_string(),
            random_state: None,
        }
    }
}

impl RandomizedSearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_iter(mut self, n: usize) -> Self {
        self.n_iter = n;
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

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

/// Outcome of one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: usize,
    pub params: TrialParams,
    pub mean_score: f64,
    pub std_score: f64,
    pub fold_scores: Vec<f64>,
    /// Candidate raised an error and is excluded from selection
    pub failed: bool,
    pub error: Option<String>,
    pub duration_secs: f64,
}

/// All candidates of one search run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub candidates: Vec<CandidateResult>,
    pub best_idx: Option<usize>,
    pub total_duration_secs: f64,
}

impl SearchResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate, keeping the first best on ties
    pub fn add_candidate(&mut self, result: CandidateResult) {
        let idx = self.candidates.len();

        if !result.failed {
            let is_better = match self.best_idx {
                None => true,
                Some(best_idx) => result.mean_score > self.candidates[best_idx].mean_score,
            };
            if is_better {
                self.best_idx = Some(idx);
            }
        }

        self.candidates.push(result);
    }

    pub fn best_candidate(&self) -> Option<&CandidateResult> {
        self.best_idx.map(|idx| &self.candidates[idx])
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_candidate().map(|c| c.mean_score)
    }

    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_candidate().map(|c| &c.params)
    }

    pub fn n_failed(&self) -> usize {
        self.candidates.iter().filter(|c| c.failed).count()
    }
}

/// Randomized search over a [`SearchSpace`], scoring each candidate with
/// stratified inner cross-validation and refitting the best one on all
/// the data it was given.
#[derive(Debug, Clone)]
pub struct RandomizedSearchCv {
    config: RandomizedSearchConfig,
    estimator: Box<dyn Classifier>,
    search_space: SearchSpace,
    results: Option<SearchResults>,
    best_estimator: Option<Box<dyn Classifier>>,
}

impl RandomizedSearchCv {
    pub fn new(
        estimator: impl Classifier + 'static,
        search_space: SearchSpace,
        config: RandomizedSearchConfig,
    ) -> Self {
        Self {
            config,
            estimator: Box::new(estimator),
            search_space,
            results: None,
            best_estimator: None,
        }
    }

    pub fn config(&self) -> &RandomizedSearchConfig {
        &self.config
    }

    pub fn results(&self) -> Option<&SearchResults> {
        self.results.as_ref()
    }

    pub fn best_score(&self) -> Option<f64> {
        self.results.as_ref().and_then(|r| r.best_score())
    }

    /// Candidate parameter sets for one run
    fn candidates(&self, rng: &mut Xoshiro256PlusPlus) -> Vec<TrialParams> {
        match self.search_space.grid() {
            Some(grid) if grid.len() <= self.config.n_iter => grid,
            Some(mut grid) => {
                // Sample without replacement from a finite grid
                grid.shuffle(rng);
                grid.truncate(self.config.n_iter);
                grid
            }
            None => (0..self.config.n_iter)
                .map(|_| self.search_space.sample(rng))
                .collect(),
        }
    }

    fn build(&self, params: &TrialParams) -> Result<Box<dyn Classifier>> {
        let mut model = self.estimator.clone_box();
        for (name, value) in params {
            model.set_param(name, value)?;
        }
        if let Some(seed) = self.config.random_state {
            model.set_random_state(seed);
        }
        Ok(model)
    }

    fn evaluate_candidate(
        &self,
        params: &TrialParams,
        x: &Array2<f64>,
        y: &Array1<f64>,
        cv: &CrossValidator,
        options: &FitOptions,
    ) -> Result<Vec<f64>> {
        let scorer = get_scorer(&self.config.scoring)?;
        let splits = cv.split(x.nrows(), Some(y))?;

        splits
            .iter()
            .map(|split| {
                let x_train = x.select(Axis(0), &split.train_indices);
                let y_train = y.select(Axis(0), &split.train_indices);
                let x_test = x.select(Axis(0), &split.test_indices);
                let y_test = y.select(Axis(0), &split.test_indices);

                let mut model = self.build(params)?;
                model.fit(&x_train, &y_train, options)?;
                scorer.score(model.as_ref(), &x_test, &y_test)
            })
            .collect()
    }
}

impl HyperparameterSearch for RandomizedSearchCv {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, options: &FitOptions) -> Result<()> {
        if self.config.n_iter == 0 {
            return Err(ShapSelectError::InvalidParameter {
                name: "n_iter".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.config.cv < 2 {
            return Err(ShapSelectError::InvalidParameter {
                name: "cv".to_string(),
                value: self.config.cv.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        get_scorer(&self.config.scoring)?;

        self.results = None;
        self.best_estimator = None;

        let start = Instant::now();
        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let candidates = self.candidates(&mut rng);

        let mut cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.config.cv,
            shuffle: true,
        });
        if let Some(seed) = self.config.random_state {
            cv = cv.with_random_state(seed);
        }

        let this = &*self;
        let evaluated: Vec<CandidateResult> = candidates
            .into_par_iter()
            .enumerate()
            .map(|(candidate_id, params)| {
                let candidate_start = Instant::now();
                let outcome = this.evaluate_candidate(&params, x, y, &cv, options);
                let duration_secs = candidate_start.elapsed().as_secs_f64();

                match outcome {
                    Ok(fold_scores) => {
                        let cv_results = CVResults::from_scores(fold_scores);
                        debug!(candidate_id, mean_score = cv_results.mean_score, "Candidate scored");
                        CandidateResult {
                            candidate_id,
                            params,
                            mean_score: cv_results.mean_score,
                            std_score: cv_results.std_score,
                            fold_scores: cv_results.scores,
                            failed: false,
                            error: None,
                            duration_secs,
                        }
                    }
                    Err(e) => {
                        warn!(candidate_id, error = %e, "Search candidate failed");
                        CandidateResult {
                            candidate_id,
                            params,
                            mean_score: f64::NAN,
                            std_score: f64::NAN,
                            fold_scores: Vec::new(),
                            failed: true,
                            error: Some(e.to_string()),
                            duration_secs,
                        }
                    }
                }
            })
            .collect();

        let mut results = SearchResults::new();
        for candidate in evaluated {
            results.add_candidate(candidate);
        }

        let best_params = results.best_params().cloned().ok_or_else(|| {
            ShapSelectError::TrainingError(format!(
                "All {} search candidates failed",
                results.candidates.len()
            ))
        })?;

        let mut best = self.build(&best_params)?;
        best.fit(x, y, options)?;

        results.total_duration_secs = start.elapsed().as_secs_f64();
        debug!(
            best_score = results.best_score(),
            n_failed = results.n_failed(),
            "Randomized search finished"
        );

        self.results = Some(results);
        self.best_estimator = Some(best);
        Ok(())
    }

    fn best_estimator(&self) -> Option<&dyn Classifier> {
        self.best_estimator.as_deref()
    }

    fn best_params(&self) -> Option<&TrialParams> {
        self.results.as_ref().and_then(|r| r.best_params())
    }

    fn base_estimator(&self) -> &dyn Classifier {
        self.estimator.as_ref()
    }

    fn set_random_state(&mut self, seed: u64) {
        self.config.random_state = Some(seed);
    }

    fn clone_box(&self) -> Box<dyn HyperparameterSearch> {
        Box::new(self.clone())
    }
}
