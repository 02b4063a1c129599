use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;
use uuid::Uuid;

use crate::config::TrainingConfig;
use crate::dataset::{DatasetCatalog, DatasetSource};
use crate::ensemble::{FittedRegressor, GradientBoosting, RandomForest, BOOSTING_NAME, FOREST_NAME};
use crate::error::TrainingError;
use crate::harmonize::{harmonize_all, labelled};
use crate::models::{CanonicalStudentRecord, FeatureRow, ModelInfo, ModelMetrics, INPUT_FEATURES};
use crate::preprocess::FeatureTransform;
use crate::search::{kfold, mae, r2_score, randomized_search, rmse, sample_candidates, Fold};

/// Fitted transform, fitted regressor and their held-out metrics. Immutable.
#[derive(Debug)]
pub struct TrainedArtifact {
    run_id: Uuid,
    trained_at: DateTime<Utc>,
    transform: FeatureTransform,
    regressor: FittedRegressor,
    metrics: ModelMetrics,
}

impl TrainedArtifact {
    pub fn metrics(&self) -> &ModelMetrics {
        &self.metrics
    }

    pub fn model_name(&self) -> &str {
        &self.metrics.model_name
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            run_id: self.run_id,
            trained_at: self.trained_at,
            metrics: self.metrics.clone(),
            features: INPUT_FEATURES.iter().map(|f| f.to_string()).collect(),
            encoded_features: self.transform.feature_names(),
        }
    }

    /// Raw (unclipped) predictions; errors when the model yields a non-finite value.
    pub fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, String> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let encoded = self.transform.transform(rows);
        let predictions = self.regressor.predict(encoded.view()).to_vec();
        if let Some(position) = predictions.iter().position(|p| !p.is_finite()) {
            return Err(format!("model produced a non-finite value for row {position}"));
        }
        Ok(predictions)
    }
}

struct Split {
    train_rows: Vec<FeatureRow>,
    x_train: Array2<f64>,
    y_train: Vec<f64>,
    x_test: Array2<f64>,
    y_test: Vec<f64>,
    transform: FeatureTransform,
}

fn split_and_encode(
    records: &[CanonicalStudentRecord],
    config: &TrainingConfig,
) -> Result<Split, TrainingError> {
    let n = records.len();
    let n_test = (n as f64 * config.test_fraction).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test < 2 || n_train < config.folds.max(2) * 2 {
        return Err(TrainingError::InsufficientData(format!(
            "{n} labelled rows leave {n_train} for training and {n_test} for testing"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(config.seed));
    let (test_idx, train_idx) = order.split_at(n_test);

    let features: Vec<FeatureRow> = records.iter().map(CanonicalStudentRecord::features).collect();
    let target = |idx: &[usize]| -> Vec<f64> {
        idx.iter()
            .map(|&i| records[i].final_grade.unwrap_or(f64::NAN))
            .collect()
    };
    let rows = |idx: &[usize]| -> Vec<FeatureRow> { idx.iter().map(|&i| features[i].clone()).collect() };

    let train_rows = rows(train_idx);
    let transform = FeatureTransform::fit(&train_rows)?;
    let x_all = transform.transform(&rows(&order));
    Ok(Split {
        train_rows,
        x_train: x_all.select(Axis(0), &(n_test..n).collect::<Vec<_>>()),
        y_train: target(train_idx),
        x_test: x_all.select(Axis(0), &(0..n_test).collect::<Vec<_>>()),
        y_test: target(test_idx),
        transform,
    })
}

/// Cross-validation folds over the training split; each fold fits its own transform.
fn encode_folds(rows: &[FeatureRow], y: &[f64], folds: usize) -> Result<Vec<Fold>, TrainingError> {
    kfold(rows.len(), folds)
        .into_iter()
        .map(|(train, test)| -> Result<Fold, TrainingError> {
            let pick = |idx: &[usize]| -> Vec<FeatureRow> { idx.iter().map(|&i| rows[i].clone()).collect() };
            let train_rows = pick(&train);
            let transform = FeatureTransform::fit(&train_rows)?;
            Ok(Fold {
                x_train: transform.transform(&train_rows),
                y_train: train.iter().map(|&i| y[i]).collect(),
                x_test: transform.transform(&pick(&test)),
                y_test: test.iter().map(|&i| y[i]).collect(),
            })
        })
        .collect()
}

struct Candidate {
    regressor: FittedRegressor,
    cv_score: f64,
    test_r2: f64,
    predictions: Vec<f64>,
}

/// Higher held-out R² wins; a tie keeps the forest.
fn select_winner(forest: Candidate, boosting: Candidate) -> Candidate {
    if forest.test_r2 >= boosting.test_r2 {
        forest
    } else {
        boosting
    }
}

/// Trains both families on labelled canonical records and keeps the better one.
pub fn train(
    records: &[CanonicalStudentRecord],
    config: &TrainingConfig,
) -> Result<TrainedArtifact, TrainingError> {
    if let Some(row) = records.iter().position(|r| r.final_grade.is_none()) {
        return Err(TrainingError::Fit(format!("record {row} has no target")));
    }
    let split = split_and_encode(records, config)?;
    let folds = encode_folds(&split.train_rows, &split.y_train, config.folds)?;
    let seed = config.seed;

    let forest_candidates =
        sample_candidates(&config.forest_grid.candidates(), config.forest_iterations, seed);
    info!(
        family = FOREST_NAME,
        candidates = forest_candidates.len(),
        "starting randomized search"
    );
    let forest = randomized_search(
        FOREST_NAME,
        &forest_candidates,
        &folds,
        |x, y, params| RandomForest::fit(x, y, *params, seed),
        |model, x| model.predict(x).to_vec(),
    )
    .ok_or_else(|| TrainingError::Fit("random forest search grid is empty".into()))?;

    let boosting_candidates = sample_candidates(
        &config.boosting_grid.candidates(),
        config.boosting_iterations,
        seed,
    );
    info!(
        family = BOOSTING_NAME,
        candidates = boosting_candidates.len(),
        "starting randomized search"
    );
    let boosting = randomized_search(
        BOOSTING_NAME,
        &boosting_candidates,
        &folds,
        |x, y, params| GradientBoosting::fit(x, y, *params),
        |model, x| model.predict(x).to_vec(),
    )
    .ok_or_else(|| TrainingError::Fit("gradient boosting search grid is empty".into()))?;

    let evaluate = |regressor: FittedRegressor, cv_score: f64| {
        let predictions = regressor.predict(split.x_test.view()).to_vec();
        let test_r2 = r2_score(&split.y_test, &predictions);
        info!(
            family = regressor.name(),
            cv_r2 = cv_score,
            test_r2,
            "evaluated best candidate on held-out split"
        );
        Candidate {
            regressor,
            cv_score,
            test_r2,
            predictions,
        }
    };

    let forest = evaluate(
        FittedRegressor::Forest(RandomForest::fit(
            split.x_train.view(),
            &split.y_train,
            forest.params,
            seed,
        )),
        forest.cv_score,
    );
    let boosting = evaluate(
        FittedRegressor::Boosting(GradientBoosting::fit(
            split.x_train.view(),
            &split.y_train,
            boosting.params,
        )),
        boosting.cv_score,
    );

    let winner = select_winner(forest, boosting);
    if !winner.test_r2.is_finite() {
        return Err(TrainingError::Fit("held-out R² is not finite".into()));
    }

    let metrics = ModelMetrics {
        model_name: winner.regressor.name().to_string(),
        r2_score: winner.test_r2,
        rmse: rmse(&split.y_test, &winner.predictions),
        mae: mae(&split.y_test, &winner.predictions),
        cv_r2_score: winner.cv_score,
        training_samples: split.y_train.len(),
        test_samples: split.y_test.len(),
        hyperparameters: winner.regressor.hyperparameters(),
    };
    info!(
        model = %metrics.model_name,
        r2 = metrics.r2_score,
        rmse = metrics.rmse,
        mae = metrics.mae,
        "model trained"
    );

    Ok(TrainedArtifact {
        run_id: Uuid::new_v4(),
        trained_at: Utc::now(),
        transform: split.transform,
        regressor: winner.regressor,
        metrics,
    })
}

/// Loads and harmonizes every source, then trains on the labelled rows.
pub fn train_from_catalog(
    catalog: &DatasetCatalog,
    config: &TrainingConfig,
) -> Result<TrainedArtifact, TrainingError> {
    let mut tables = Vec::new();
    for source in DatasetSource::ALL {
        tables.push((source, catalog.load(source)?));
    }
    let records = harmonize_all(tables.iter().map(|(source, table)| (*source, table)));
    let total = records.len();
    let records = labelled(records);
    info!(
        harmonized = total,
        labelled = records.len(),
        "prepared canonical training table"
    );
    train(&records, config)
}
