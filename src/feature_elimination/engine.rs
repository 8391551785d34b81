//! The recursive elimination loop

use super::config::{EarlyStoppingConfig, EliminationConfig, Step};
use super::fold::{EarlyStoppingFoldEvaluator, FoldEvaluator, FoldResult, FoldTask, PlainFoldEvaluator};
use super::plot::EliminationPlot;
use super::report::{EliminationReport, RoundRecord};
use super::step::features_to_remove;
use crate::data::{FeatureMatrix, Target};
use crate::error::{ShapSelectError, Result};
use crate::explainability::{mean_abs_shap, SamplingExplainer, ShapExplainer, ShapOptions};
use crate::metrics::{get_scorer, Scorer};
use crate::training::{CVResults, CVSplit, CVStrategy, CrossValidator, Fittable};
use ndarray::Array1;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Active features between rounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EliminationState {
    /// Active feature names in original column order
    pub active: Vec<String>,
    /// Rounds completed so far
    pub round: usize,
}

impl EliminationState {
    pub fn new(columns: &[String]) -> Self {
        Self {
            active: columns.to_vec(),
            round: 0,
        }
    }

    /// State after `record`'s round: the lowest-importance non-pinned
    /// features are dropped, ties going to the earlier column.
    ///
    /// Once the active set is at `floor` the state only advances its round
    /// counter.
    pub fn advance(
        self,
        record: &RoundRecord,
        pinned: &BTreeSet<String>,
        step: Step,
        floor: usize,
    ) -> EliminationState {
        let current = self.active.len();
        let n_remove = features_to_remove(current, step.num_features_to_remove(current), floor);

        let mut candidates: Vec<(&String, f64)> = record
            .features_set
            .iter()
            .zip(record.shap_importance_mean.iter().copied())
            .filter(|(name, _)| !pinned.contains(*name))
            .collect();
        // Stable, so equal importances keep column order
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        let removed: BTreeSet<&String> = candidates
            .into_iter()
            .take(n_remove)
            .map(|(name, _)| name)
            .collect();

        EliminationState {
            active: self
                .active
                .iter()
                .filter(|name| !removed.contains(name))
                .cloned()
                .collect(),
            round: self.round + 1,
        }
    }
}

/// Recursive feature elimination driven by cross-validated SHAP importance.
///
/// Each round fits the model on every fold, scores it on train and
/// validation rows, and averages the mean |SHAP| of each active feature
/// over the folds. The least important non-pinned features are dropped
/// according to `step` until `max(min_features_to_select, |pinned|)`
/// features remain; that last feature set is evaluated too.
#[derive(Debug)]
pub struct ShapRfeCv<E: FoldEvaluator = PlainFoldEvaluator> {
    model: Fittable,
    config: EliminationConfig,
    evaluator: E,
    explainer: Box<dyn ShapExplainer>,
    report: Option<EliminationReport>,
}

/// Elimination with early-stopped model fits
pub type EarlyStoppingShapRfeCv = ShapRfeCv<EarlyStoppingFoldEvaluator>;

impl ShapRfeCv<PlainFoldEvaluator> {
    pub fn new(model: Fittable, config: EliminationConfig) -> Self {
        Self::with_evaluator(model, config, PlainFoldEvaluator)
    }
}

impl ShapRfeCv<EarlyStoppingFoldEvaluator> {
    pub fn early_stopping(
        model: Fittable,
        config: EliminationConfig,
        early_stopping: EarlyStoppingConfig,
    ) -> Self {
        Self::with_evaluator(model, config, EarlyStoppingFoldEvaluator::new(early_stopping))
    }
}

impl<E: FoldEvaluator> ShapRfeCv<E> {
    pub fn with_evaluator(model: Fittable, config: EliminationConfig, evaluator: E) -> Self {
        Self {
            model,
            config,
            evaluator,
            explainer: Box::new(SamplingExplainer::default()),
            report: None,
        }
    }

    /// Replace the default [`SamplingExplainer`]
    pub fn with_explainer(mut self, explainer: impl ShapExplainer + 'static) -> Self {
        self.explainer = Box::new(explainer);
        self
    }

    pub fn config(&self) -> &EliminationConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn model(&self) -> &Fittable {
        &self.model
    }

    pub fn is_fitted(&self) -> bool {
        self.report.is_some()
    }

    pub fn check_if_fitted(&self) -> Result<()> {
        if self.is_fitted() {
            Ok(())
        } else {
            Err(ShapSelectError::NotFitted("ShapRfeCv".to_string()))
        }
    }

    /// Run the elimination.
    ///
    /// `columns_to_keep` are never removed. On error the engine is left
    /// unfitted.
    pub fn fit(
        &mut self,
        x: &FeatureMatrix,
        y: &Target,
        columns_to_keep: &[&str],
        shap_options: ShapOptions,
    ) -> Result<&mut Self> {
        self.report = None;

        self.config.validate()?;
        self.evaluator.validate(&self.model)?;
        let scorer = get_scorer(&self.config.scoring)?;

        let n_features = x.n_cols();
        let mut pinned = BTreeSet::new();
        for &name in columns_to_keep {
            if x.column_position(name).is_none() {
                return Err(ShapSelectError::ConfigError(format!(
                    "Column to keep '{}' is not in the feature matrix",
                    name
                )));
            }
            pinned.insert(name.to_string());
        }

        let floor = self.config.min_features_to_select.max(pinned.len());
        if floor >= n_features {
            return Err(ShapSelectError::ConfigError(format!(
                "Nothing to eliminate: {} features with a floor of {} \
                 (min_features_to_select = {}, {} columns to keep)",
                n_features,
                floor,
                self.config.min_features_to_select,
                pinned.len()
            )));
        }

        let labels = aligned_labels(x, y)?;
        debug!(
            model = self.model.name(),
            search = self.model.is_search(),
            n_features,
            floor,
            "Starting elimination"
        );

        let mut model = self.model.clone();
        if let Some(seed) = self.config.random_state {
            model.set_random_state(seed);
            self.explainer.set_random_state(seed);
        }

        let mut cv = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.config.cv,
            shuffle: self.config.random_state.is_some(),
        });
        if let Some(seed) = self.config.random_state {
            cv = cv.with_random_state(seed);
        }
        let splits = cv.split(x.n_rows(), Some(&labels))?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.n_jobs.unwrap_or(0))
            .build()?;

        let mut state = EliminationState::new(x.columns());
        let mut records = Vec::new();

        loop {
            let mut record = self.run_round(
                x,
                &labels,
                &model,
                &splits,
                &scorer,
                &shap_options,
                &state,
                &pool,
            )?;

            let next = state.clone().advance(&record, &pinned, self.config.step, floor);
            record.eliminated_features = state
                .active
                .iter()
                .filter(|name| !next.active.contains(*name))
                .cloned()
                .collect();
            record.num_eliminated = record.eliminated_features.len();

            if self.config.verbose {
                info!(
                    round = record.round,
                    num_features = record.num_features,
                    train_metric_mean = record.train_metric_mean,
                    val_metric_mean = record.val_metric_mean,
                    eliminated = ?record.eliminated_features,
                    "Round finished"
                );
            } else {
                debug!(
                    round = record.round,
                    num_features = record.num_features,
                    val_metric_mean = record.val_metric_mean,
                    "Round finished"
                );
            }

            let done = record.num_eliminated == 0;
            records.push(record);
            if done {
                break;
            }
            state = next;
        }

        self.report = Some(EliminationReport::new(scorer.name(), records));
        Ok(self)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_round(
        &self,
        x: &FeatureMatrix,
        labels: &Array1<f64>,
        model: &Fittable,
        splits: &[CVSplit],
        scorer: &Scorer,
        shap_options: &ShapOptions,
        state: &EliminationState,
        pool: &rayon::ThreadPool,
    ) -> Result<RoundRecord> {
        let x_active = x.select_columns(&state.active)?;
        let n_active = x_active.n_cols();

        let explainer = self.explainer.as_ref();
        let evaluator = &self.evaluator;
        let random_state = self.config.random_state;

        // Collected in fold order whatever order they finish in
        let results: Vec<FoldResult> = pool.install(|| {
            splits
                .par_iter()
                .map(|split| {
                    evaluator.evaluate(&FoldTask {
                        x: x_active.values(),
                        y: labels,
                        model,
                        train: &split.train_indices,
                        val: &split.test_indices,
                        scorer,
                        explainer,
                        shap_options,
                        random_state,
                        fold_idx: split.fold_idx,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let importances: Vec<Array1<f64>> =
            results.iter().map(|r| mean_abs_shap(&r.shap_values)).collect();
        let (shap_importance_mean, shap_importance_std): (Vec<f64>, Vec<f64>) = (0..n_active)
            .map(|j| {
                let per_fold = CVResults::from_scores(importances.iter().map(|imp| imp[j]).collect());
                (per_fold.mean_score, per_fold.std_score)
            })
            .unzip();

        let train = CVResults::from_scores(results.iter().map(|r| r.train_score).collect());
        let val = CVResults::from_scores(results.iter().map(|r| r.val_score).collect());

        Ok(RoundRecord {
            round: state.round + 1,
            num_features: state.active.len(),
            features_set: state.active.clone(),
            shap_importance_mean,
            shap_importance_std,
            train_metric_mean: train.mean_score,
            train_metric_std: train.std_score,
            val_metric_mean: val.mean_score,
            val_metric_std: val.std_score,
            num_eliminated: 0,
            eliminated_features: Vec::new(),
        })
    }

    /// The elimination trace
    pub fn report(&self) -> Result<&EliminationReport> {
        self.report
            .as_ref()
            .ok_or_else(|| ShapSelectError::NotFitted("ShapRfeCv".to_string()))
    }

    /// The elimination trace as a table, one row per round
    pub fn compute(&self) -> Result<DataFrame> {
        self.report()?.to_dataframe()
    }

    /// `fit` followed by `compute`
    pub fn fit_compute(
        &mut self,
        x: &FeatureMatrix,
        y: &Target,
        columns_to_keep: &[&str],
        shap_options: ShapOptions,
    ) -> Result<DataFrame> {
        self.fit(x, y, columns_to_keep, shap_options)?;
        self.compute()
    }

    /// Features of the round that evaluated exactly `num_features` features
    pub fn get_reduced_features_set(&self, num_features: usize) -> Result<Vec<String>> {
        self.report()?.select(num_features)
    }

    /// Train and validation score curves over the rounds
    pub fn plot(&self) -> Result<EliminationPlot> {
        Ok(EliminationPlot::from_report(self.report()?))
    }

    /// Evaluate a single train/validation split with this engine's model,
    /// explainer and evaluator.
    ///
    /// `train` and `val` are row positions into `x`.
    pub fn get_feature_shap_values_per_fold(
        &self,
        x: &FeatureMatrix,
        y: &Target,
        train: &[usize],
        val: &[usize],
        scorer: &Scorer,
        shap_options: &ShapOptions,
    ) -> Result<FoldResult> {
        self.evaluator.validate(&self.model)?;
        let labels = aligned_labels(x, y)?;
        if let Some(&bad) = train.iter().chain(val).find(|&&p| p >= x.n_rows()) {
            return Err(ShapSelectError::ValidationError(format!(
                "Row position {} out of range for {} rows",
                bad,
                x.n_rows()
            )));
        }

        let mut model = self.model.clone();
        if let Some(seed) = self.config.random_state {
            model.set_random_state(seed);
        }

        self.evaluator.evaluate(&FoldTask {
            x: x.values(),
            y: &labels,
            model: &model,
            train,
            val,
            scorer,
            explainer: self.explainer.as_ref(),
            shap_options,
            random_state: self.config.random_state,
            fold_idx: 0,
        })
    }
}

/// Target values ordered like the rows of `x`
fn aligned_labels(x: &FeatureMatrix, y: &Target) -> Result<Array1<f64>> {
    if y.len() != x.n_rows() {
        return Err(ShapSelectError::ShapeError {
            expected: format!("{} labels", x.n_rows()),
            actual: format!("{} labels", y.len()),
        });
    }
    if y.index() == x.index() {
        return Ok(y.values().clone());
    }

    let positions: HashMap<i64, usize> = y.index().iter().enumerate().map(|(p, &id)| (id, p)).collect();
    x.index()
        .iter()
        .map(|id| {
            positions.get(id).map(|&p| y.values()[p]).ok_or_else(|| {
                ShapSelectError::DataError(format!("Row {} has no label in '{}'", id, y.name()))
            })
        })
        .collect()
}
