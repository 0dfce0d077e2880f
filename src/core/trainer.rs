use super::collector::FeatureCollector;
use super::extract::FeatureExtractor;
use super::forest::{ForestParams, RandomForestRegressor};
use super::table::FeatureTable;
use crate::config::PipelineConfig;
use crate::engine::GeoEngine;
use crate::io::field_data::{observations_table, FieldObservation, COLUMN_YIELD};
use crate::io::model_store::ModelArtifact;
use crate::types::{DateWindow, YieldError, YieldResult, EXPECTED_FEATURES};
use geo_types::{Geometry, Point};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Held-out evaluation of a fitted model
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub r2: f64,
    pub mae: f64,
    pub n_train: usize,
    pub n_test: usize,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub report: TrainingReport,
}

/// Fits the yield model from field observations and remote-sensing features
pub struct ModelTrainer<'a> {
    config: &'a PipelineConfig,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Feature table at each observation point, in observation order
    pub fn extract_features(
        &self,
        engine: &dyn GeoEngine,
        observations: &[FieldObservation],
        window: &DateWindow,
    ) -> YieldResult<FeatureTable> {
        let points: Vec<Geometry<f64>> = observations
            .iter()
            .map(|o| Geometry::Point(Point::new(o.lon, o.lat)))
            .collect();
        let image = FeatureCollector::new(self.config)
            .season_layers(window)
            .composite();
        let table = FeatureExtractor::new(self.config.scale, self.config.training_max_pixels)
            .extract(engine, &image, &points)?;
        Ok(table.reindex(&EXPECTED_FEATURES))
    }

    /// Extract features for `year`, join with the observations and fit.
    /// The returned artifact is not persisted.
    pub fn train(
        &self,
        engine: &dyn GeoEngine,
        observations: &[FieldObservation],
        year: i32,
    ) -> YieldResult<TrainingOutcome> {
        if observations.is_empty() {
            return Err(YieldError::InsufficientData("No field observations".to_string()));
        }
        let window = DateWindow::for_season(year, &self.config.season)?;
        log::info!(
            "Training on {} field observations for {}",
            observations.len(),
            window
        );

        let features = self.extract_features(engine, observations, &window)?;
        let joined = observations_table(observations).hconcat(&features)?;
        let (complete, kept) = joined.drop_incomplete();
        if kept.len() < joined.n_rows() {
            log::warn!(
                "Dropped {} observations with missing features",
                joined.n_rows() - kept.len()
            );
        }
        self.fit_table(&complete)
    }

    /// Split, fit and evaluate on a complete table holding a `yield` column
    /// and every expected feature column
    pub fn fit_table(&self, table: &FeatureTable) -> YieldResult<TrainingOutcome> {
        let targets = table.column(COLUMN_YIELD).ok_or_else(|| {
            YieldError::InvalidFormat(format!("Training table has no '{}' column", COLUMN_YIELD))
        })?;
        for name in EXPECTED_FEATURES {
            if table.column_index(name).is_none() {
                return Err(YieldError::InvalidFormat(format!(
                    "Training table has no '{}' column",
                    name
                )));
            }
        }
        if !table.is_complete() {
            return Err(YieldError::InvalidFormat(
                "Training table contains missing values".to_string(),
            ));
        }
        let targets: Vec<f64> = targets
            .into_iter()
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| YieldError::InvalidFormat("Training targets contain missing values".to_string()))?;

        let (train_idx, test_idx) =
            train_test_split(table.n_rows(), self.config.test_fraction, self.config.seed)?;

        let x_train_table = table.take_rows(&train_idx).reindex(&EXPECTED_FEATURES);
        let x_test = table.take_rows(&test_idx).reindex(&EXPECTED_FEATURES).to_matrix();
        let y_train: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();
        let y_test: Vec<f64> = test_idx.iter().map(|&i| targets[i]).collect();

        let params = ForestParams {
            n_trees: self.config.n_trees,
            seed: self.config.seed,
            ..ForestParams::default()
        };
        let forest = RandomForestRegressor::fit(&x_train_table.to_matrix(), &y_train, params)?;

        let y_pred = forest.predict(&x_test)?;
        let report = TrainingReport {
            r2: r2_score(&y_test, &y_pred),
            mae: mean_absolute_error(&y_test, &y_pred),
            n_train: train_idx.len(),
            n_test: test_idx.len(),
        };
        log::info!("R²: {:.4}", report.r2);
        log::info!("MAE: {:.4}", report.mae);

        let training_means = x_train_table
            .column_means()
            .into_iter()
            .map(|m| m.unwrap_or(f64::NAN))
            .collect();
        let artifact = ModelArtifact::new(
            EXPECTED_FEATURES.iter().map(|s| s.to_string()).collect(),
            training_means,
            forest,
        )?;
        Ok(TrainingOutcome { artifact, report })
    }
}

/// Seeded shuffle split into `(train, test)` row indices. The test side gets
/// `ceil(test_fraction * n)` rows.
pub fn train_test_split(
    n: usize,
    test_fraction: f64,
    seed: u64,
) -> YieldResult<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(YieldError::InvalidFormat(format!(
            "Test fraction {} must be between 0 and 1",
            test_fraction
        )));
    }
    let n_test = (test_fraction * n as f64).ceil() as usize;
    if n < 2 || n_test >= n {
        return Err(YieldError::InsufficientData(format!(
            "{} complete rows are not enough for a train/test split",
            n
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Coefficient of determination. With constant targets it is 1.0 for a
/// perfect prediction and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len() as f64;
    if y_true.is_empty() {
        return f64::NAN;
    }
    let mean = y_true.iter().sum::<f64>() / n;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p) * (t - p)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}
