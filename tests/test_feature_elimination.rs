//! Integration test: SHAP-driven recursive feature elimination end-to-end

use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use shap_select::data::{preprocess_labels, FeatureMatrix, Target};
use shap_select::explainability::{SamplingExplainer, SamplingExplainerConfig, ShapOptions};
use shap_select::feature_elimination::{
    EarlyStoppingConfig, EliminationConfig, ShapRfeCv, Step,
};
use shap_select::metrics::get_scorer;
use shap_select::optimizer::{ParameterValue, RandomizedSearchConfig, RandomizedSearchCv, SearchSpace};
use shap_select::training::{
    Classifier, DecisionTreeClassifier, FitOptions, Fittable, GradientBoostingClassifier,
    GradientBoostingConfig, LogisticRegression,
};
use shap_select::{Result, ShapSelectError};

fn toy_df() -> DataFrame {
    df!(
        "id" => &[1i64, 2, 3, 4, 5, 6, 7, 8],
        "col_1" => &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0],
        "col_2" => &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        "col_3" => &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]
    )
    .unwrap()
}

fn toy_data() -> (FeatureMatrix, Target) {
    let x = FeatureMatrix::from_dataframe_with_index(&toy_df(), "id").unwrap();
    let y = preprocess_labels(&[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0], "y", x.index()).unwrap();
    (x, y)
}

fn stump() -> Fittable {
    Fittable::estimator(DecisionTreeClassifier::new().with_max_depth(1))
}

fn fast_shap() -> ShapOptions {
    ShapOptions::approximate().with_check_additivity(false)
}

fn tree_search() -> Fittable {
    let space = SearchSpace::new()
        .categorical("criterion", vec!["gini"])
        .choice(
            "min_samples_split",
            vec![ParameterValue::Int(1), ParameterValue::Int(2)],
        );
    let config = RandomizedSearchConfig::new()
        .with_n_iter(2)
        .with_cv(2)
        .with_random_state(1);
    Fittable::search(RandomizedSearchCv::new(
        DecisionTreeClassifier::new().with_max_depth(1),
        space,
        config,
    ))
}

fn base_config() -> EliminationConfig {
    EliminationConfig::new()
        .with_step(1usize)
        .with_cv(2)
        .with_random_state(1)
}

#[test]
fn test_decision_tree_elimination() {
    let (x, y) = toy_data();
    let mut rfe = ShapRfeCv::new(stump(), base_config());

    let report = rfe.fit_compute(&x, &y, &[], fast_shap()).unwrap();
    assert_eq!(report.height(), 3);

    let rounds = rfe.report().unwrap().records();
    assert_eq!(rounds[0].eliminated_features, vec!["col_1"]);
    assert_eq!(rounds[1].eliminated_features, vec!["col_2"]);
    assert_eq!(rounds[2].num_eliminated, 0);

    assert_eq!(rfe.get_reduced_features_set(1).unwrap(), vec!["col_3"]);
    assert!((rounds[0].val_metric_mean - 1.0).abs() < 1e-12);
}

#[test]
fn test_logistic_regression_elimination() {
    let (x, y) = toy_data();
    let model = Fittable::estimator(LogisticRegression::new().with_c(1.0));
    let mut rfe = ShapRfeCv::new(model, base_config());

    let report = rfe.fit_compute(&x, &y, &[], ShapOptions::default()).unwrap();
    assert_eq!(report.height(), 3);
    assert_eq!(rfe.report().unwrap().num_features(), vec![3, 2, 1]);
    assert_eq!(rfe.get_reduced_features_set(1).unwrap(), vec!["col_3"]);
}

#[test]
fn test_search_elimination() {
    let (x, y) = toy_data();
    let config = base_config().with_step(0.8);
    let mut rfe = ShapRfeCv::new(tree_search(), config);

    let report = rfe.fit_compute(&x, &y, &[], fast_shap()).unwrap();
    assert_eq!(report.height(), 2);
    assert_eq!(rfe.get_reduced_features_set(1).unwrap(), vec!["col_3"]);
}

#[test]
fn test_search_elimination_with_columns_to_keep() {
    let (x, y) = toy_data();
    let config = base_config().with_step(0.8);
    let mut rfe = ShapRfeCv::new(tree_search(), config);

    let report = rfe
        .fit_compute(&x, &y, &["col_2", "col_3"], fast_shap())
        .unwrap();
    assert_eq!(report.height(), 2);
    assert_eq!(rfe.get_reduced_features_set(2).unwrap(), vec!["col_2", "col_3"]);
}

#[test]
fn test_columns_to_keep_with_larger_step() {
    let (x, y) = toy_data();
    let config = base_config().with_step(2usize);
    let mut rfe = ShapRfeCv::new(stump(), config);

    rfe.fit(&x, &y, &["col_2", "col_3"], fast_shap()).unwrap();
    let records = rfe.report().unwrap().records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].eliminated_features, vec!["col_1"]);
    assert_eq!(records[1].features_set, vec!["col_2", "col_3"]);

    for record in records {
        assert!(record.features_set.iter().any(|f| f == "col_2"));
        assert!(record.features_set.iter().any(|f| f == "col_3"));
    }
}

#[test]
fn test_single_fold_evaluation() {
    let (x, y) = toy_data();
    let rfe = ShapRfeCv::new(stump(), base_config());
    let scorer = get_scorer("roc_auc").unwrap();

    let train: Vec<usize> = (2..8).collect();
    let result = rfe
        .get_feature_shap_values_per_fold(&x, &y, &train, &[0, 1], &scorer, &ShapOptions::default())
        .unwrap();

    assert!((result.val_score - 1.0).abs() < 1e-12);
    assert!(result.train_score > 0.9);
    assert_eq!(result.shap_values.dim(), (2, 3));
}

#[test]
fn test_not_fitted() {
    let rfe = ShapRfeCv::new(stump(), base_config());
    assert!(!rfe.is_fitted());
    assert!(matches!(rfe.compute(), Err(ShapSelectError::NotFitted(_))));
    assert!(matches!(rfe.get_reduced_features_set(1), Err(ShapSelectError::NotFitted(_))));
    assert!(matches!(rfe.plot(), Err(ShapSelectError::NotFitted(_))));
}

#[test]
fn test_compute_is_repeatable() {
    let (x, y) = toy_data();
    let mut rfe = ShapRfeCv::new(stump(), base_config());
    rfe.fit(&x, &y, &[], fast_shap()).unwrap();

    let first = rfe.compute().unwrap();
    let second = rfe.compute().unwrap();
    assert!(first.equals(&second));

    let plot = rfe.plot().unwrap();
    assert_eq!(plot.num_features, vec![3, 2, 1]);
    assert!(plot.to_svg(640, 480).contains("roc_auc"));
}

#[test]
fn test_same_seed_same_trace() {
    let (x, y) = toy_data();
    let model = Fittable::estimator(LogisticRegression::new());

    let mut a = ShapRfeCv::new(model.clone(), base_config());
    let mut b = ShapRfeCv::new(model, base_config());
    a.fit(&x, &y, &[], ShapOptions::default()).unwrap();
    b.fit(&x, &y, &[], ShapOptions::default()).unwrap();

    assert_eq!(a.report().unwrap(), b.report().unwrap());
}

#[test]
fn test_refit_replaces_trace() {
    let (x, y) = toy_data();
    let mut rfe = ShapRfeCv::new(stump(), base_config());
    rfe.fit(&x, &y, &[], fast_shap()).unwrap();
    rfe.fit(&x, &y, &["col_1", "col_3"], fast_shap()).unwrap();

    assert_eq!(rfe.report().unwrap().num_features(), vec![3, 2]);
}

/// Scores with the third active column and refuses to fit on fewer than
/// three columns
#[derive(Debug, Clone)]
struct NeedsThreeColumns;

impl Classifier for NeedsThreeColumns {
    fn name(&self) -> &str {
        "NeedsThreeColumns"
    }

    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>, _options: &FitOptions) -> Result<()> {
        if x.ncols() < 3 {
            return Err(ShapSelectError::TrainingError(format!(
                "need 3 columns, got {}",
                x.ncols()
            )));
        }
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let mut proba = Array2::zeros((x.nrows(), 2));
        for (i, row) in x.rows().into_iter().enumerate() {
            let p = if row[2] > 0.5 { 0.9 } else { 0.1 };
            proba[[i, 0]] = 1.0 - p;
            proba[[i, 1]] = p;
        }
        Ok(proba)
    }

    fn clone_box(&self) -> Box<dyn Classifier> {
        Box::new(self.clone())
    }
}

#[test]
fn test_fold_failure_aborts_run() {
    let (x, y) = toy_data();
    let mut rfe = ShapRfeCv::new(Fittable::estimator(NeedsThreeColumns), base_config());

    // Four columns with three pinned never go below three active
    let mut wide = toy_df();
    wide.with_column(Series::new("col_4".into(), vec![0.5; 8])).unwrap();
    let x_wide = FeatureMatrix::from_dataframe_with_index(&wide, "id").unwrap();
    rfe.fit(&x_wide, &y, &["col_1", "col_2", "col_3"], fast_shap())
        .unwrap();
    assert_eq!(rfe.report().unwrap().num_features(), vec![4, 3]);

    // Round 2 runs on two columns and every fold fails
    match rfe.fit(&x, &y, &[], fast_shap()) {
        Err(ShapSelectError::TrainingError(msg)) => assert_eq!(msg, "need 3 columns, got 2"),
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
    assert!(!rfe.is_fitted());
    assert!(matches!(rfe.compute(), Err(ShapSelectError::NotFitted(_))));
}

#[test]
fn test_invalid_selection() {
    let (x, y) = toy_data();
    let mut rfe = ShapRfeCv::new(stump(), base_config());
    rfe.fit(&x, &y, &[], fast_shap()).unwrap();

    match rfe.get_reduced_features_set(5) {
        Err(ShapSelectError::InvalidSelection { requested, available }) => {
            assert_eq!(requested, 5);
            assert_eq!(available, vec![3, 2, 1]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_labels_follow_row_ids() {
    let (x, _) = toy_data();
    // Same labels listed in reverse id order
    let y = preprocess_labels(
        &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
        "y",
        &[8, 7, 6, 5, 4, 3, 2, 1],
    )
    .unwrap();

    let mut rfe = ShapRfeCv::new(stump(), base_config());
    rfe.fit(&x, &y, &[], fast_shap()).unwrap();
    assert_eq!(rfe.get_reduced_features_set(1).unwrap(), vec!["col_3"]);

    let missing = preprocess_labels(
        &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0],
        "y",
        &[1, 2, 3, 4, 5, 6, 7, 9],
    )
    .unwrap();
    assert!(matches!(
        rfe.fit(&x, &missing, &[], fast_shap()),
        Err(ShapSelectError::DataError(_))
    ));
    assert!(!rfe.is_fitted());
}

#[test]
fn test_configuration_errors() {
    let (x, y) = toy_data();

    let mut rfe = ShapRfeCv::new(stump(), base_config());
    assert!(matches!(
        rfe.fit(&x, &y, &["col_9"], fast_shap()),
        Err(ShapSelectError::ConfigError(_))
    ));

    let mut rfe = ShapRfeCv::new(stump(), base_config().with_min_features_to_select(3));
    assert!(matches!(rfe.fit(&x, &y, &[], fast_shap()), Err(ShapSelectError::ConfigError(_))));

    let mut rfe = ShapRfeCv::new(stump(), base_config());
    assert!(rfe.fit(&x, &y, &["col_1", "col_2", "col_3"], fast_shap()).is_err());

    let mut rfe = ShapRfeCv::new(stump(), base_config().with_step(Step::Fraction(1.5)));
    assert!(rfe.fit(&x, &y, &[], fast_shap()).is_err());

    let mut rfe = ShapRfeCv::new(stump(), base_config().with_scoring("median_error"));
    assert!(matches!(rfe.fit(&x, &y, &[], fast_shap()), Err(ShapSelectError::ConfigError(_))));
}

#[test]
fn test_early_stopping_requires_capable_model() {
    let (x, y) = toy_data();
    let mut rfe = ShapRfeCv::early_stopping(stump(), base_config(), EarlyStoppingConfig::new());

    assert!(matches!(rfe.fit(&x, &y, &[], fast_shap()), Err(ShapSelectError::ConfigError(_))));

    let scorer = get_scorer("roc_auc").unwrap();
    assert!(rfe
        .get_feature_shap_values_per_fold(&x, &y, &[2, 3, 4, 5, 6, 7], &[0, 1], &scorer, &fast_shap())
        .is_err());
}

/// Five features where only `f5` carries the label
fn boosting_data() -> (FeatureMatrix, Target) {
    let n = 120;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    let mut values = Array2::zeros((n, 5));
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        for j in 0..4 {
            values[[i, j]] = rng.gen_range(-1.0..1.0);
        }
        let signal: f64 = rng.gen_range(-1.0..1.0);
        values[[i, 4]] = signal;
        labels.push(if signal > 0.0 { 1.0 } else { 0.0 });
    }
    let columns = (1..=5).map(|i| format!("f{}", i)).collect();
    let x = FeatureMatrix::new(columns, values).unwrap();
    let y = preprocess_labels(&labels, "target", x.index()).unwrap();
    (x, y)
}

fn boosting_model() -> Fittable {
    Fittable::estimator(GradientBoostingClassifier::new(GradientBoostingConfig {
        n_estimators: 50,
        subsample: 1.0,
        colsample_bytree: 1.0,
        ..GradientBoostingConfig::default()
    }))
}

fn small_background() -> SamplingExplainer {
    SamplingExplainer::new(SamplingExplainerConfig {
        max_background: 20,
        ..SamplingExplainerConfig::default()
    })
}

fn early_stopping_config() -> EarlyStoppingConfig {
    EarlyStoppingConfig::new()
        .with_early_stopping_rounds(5)
        .with_eval_metric("auc")
}

#[test]
fn test_early_stopping_elimination() {
    let (x, y) = boosting_data();
    let config = EliminationConfig::new()
        .with_step(1usize)
        .with_cv(3)
        .with_random_state(1);
    let mut rfe = ShapRfeCv::early_stopping(boosting_model(), config, early_stopping_config())
        .with_explainer(small_background());

    let report = rfe.fit_compute(&x, &y, &[], ShapOptions::default()).unwrap();
    assert_eq!(report.height(), 5);
    assert_eq!(rfe.get_reduced_features_set(1).unwrap(), vec!["f5"]);

    let first = &rfe.report().unwrap().records()[0];
    let f5 = first.importance_of("f5").unwrap();
    for noise in ["f1", "f2", "f3", "f4"] {
        assert!(first.importance_of(noise).unwrap() < f5);
    }
    assert!(first.val_metric_mean > 0.8);
}

#[test]
fn test_early_stopping_single_fold() {
    let (x, y) = boosting_data();
    let rfe = ShapRfeCv::early_stopping(
        boosting_model(),
        EliminationConfig::new().with_random_state(3),
        early_stopping_config(),
    )
    .with_explainer(small_background());
    let scorer = get_scorer("roc_auc").unwrap();

    // Validation rows need both classes for ROC AUC
    let labels = y.values();
    let positives = (0..labels.len()).filter(|&i| labels[i] == 1.0).take(3);
    let negatives = (0..labels.len()).filter(|&i| labels[i] == 0.0).take(2);
    let val: Vec<usize> = positives.chain(negatives).collect();
    let train: Vec<usize> = (0..labels.len()).filter(|i| !val.contains(i)).take(45).collect();
    let result = rfe
        .get_feature_shap_values_per_fold(&x, &y, &train, &val, &scorer, &ShapOptions::default())
        .unwrap();

    assert!(result.train_score > 0.6);
    assert!(result.val_score > 0.6);
    assert_eq!(result.shap_values.dim(), (5, 5));
}

#[test]
fn test_early_stopping_search_elimination() {
    let (x, y) = boosting_data();
    let space = SearchSpace::new().choice(
        "max_depth",
        vec![ParameterValue::Int(2), ParameterValue::Int(3)],
    );
    let search = RandomizedSearchCv::new(
        GradientBoostingClassifier::new(GradientBoostingConfig {
            n_estimators: 50,
            subsample: 1.0,
            colsample_bytree: 1.0,
            ..GradientBoostingConfig::default()
        }),
        space,
        RandomizedSearchConfig::new().with_n_iter(2).with_cv(2),
    );
    let config = EliminationConfig::new()
        .with_step(1usize)
        .with_cv(3)
        .with_random_state(1);
    let mut rfe = ShapRfeCv::early_stopping(Fittable::search(search), config, early_stopping_config())
        .with_explainer(small_background());

    let report = rfe.fit_compute(&x, &y, &[], ShapOptions::default()).unwrap();
    assert_eq!(report.height(), 5);
    assert_eq!(rfe.get_reduced_features_set(1).unwrap(), vec!["f5"]);
}
