use super::collector::FeatureCollector;
use super::extract::FeatureExtractor;
use super::masking::AreaMasker;
use super::table::FeatureTable;
use crate::config::PipelineConfig;
use crate::engine::GeoEngine;
use crate::io::model_store::ModelArtifact;
use crate::types::{
    DateWindow, PredictedRegion, PredictionResult, Region, YieldError, YieldResult,
};
use geo_types::Geometry;
use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;

/// Anything that maps a feature matrix to one yield per row
pub trait RegressionModel: Send + Sync {
    /// Columns the model expects, in matrix column order
    fn feature_names(&self) -> &[String];

    fn predict(&self, features: &Array2<f64>) -> YieldResult<Vec<f64>>;

    /// Training-time column means, used when a batch cannot impute a column
    fn training_means(&self) -> Option<&[f64]> {
        None
    }
}

impl RegressionModel for ModelArtifact {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &Array2<f64>) -> YieldResult<Vec<f64>> {
        self.forest.predict(features)
    }

    fn training_means(&self) -> Option<&[f64]> {
        Some(&self.training_means)
    }
}

/// Turns regions or feature tables into yield predictions with a loaded model.
///
/// The model is shared read-only; one predictor can serve any number of
/// requests.
pub struct YieldPredictor {
    model: Arc<dyn RegressionModel>,
    config: PipelineConfig,
}

impl YieldPredictor {
    pub fn new(model: Arc<dyn RegressionModel>, config: PipelineConfig) -> Self {
        Self { model, config }
    }

    /// Load the model artifact at `path`; fails with
    /// [`YieldError::ModelNotFound`] if there is none
    pub fn from_path<P: AsRef<Path>>(path: P, config: PipelineConfig) -> YieldResult<Self> {
        let artifact = ModelArtifact::load(path)?;
        Ok(Self::new(Arc::new(artifact), config))
    }

    pub fn model(&self) -> &Arc<dyn RegressionModel> {
        &self.model
    }

    /// Reindex to the model's columns and impute missing cells with the
    /// column mean of this batch. A column with no value anywhere in the batch
    /// falls back to the model's training mean when it has one.
    pub fn align(&self, table: &FeatureTable) -> FeatureTable {
        let mut aligned = table.reindex(self.model.feature_names());
        let mut fill = aligned.column_means();

        let baseline = self.model.training_means().filter(|b| {
            let usable = b.len() == aligned.n_cols();
            if !usable {
                log::warn!(
                    "Ignoring {} training means for {} model features",
                    b.len(),
                    aligned.n_cols()
                );
            }
            usable
        });
        if let Some(baseline) = baseline {
            for ((value, column), mean) in fill.iter_mut().zip(aligned.columns()).zip(baseline) {
                if value.is_none() && aligned.n_rows() > 0 {
                    log::warn!(
                        "Column '{}' has no values in this batch, using training mean {:.4}",
                        column,
                        mean
                    );
                    *value = Some(*mean);
                }
            }
        }

        let filled = aligned.fill_missing(&fill);
        if filled > 0 {
            log::warn!("Imputed {} missing feature values", filled);
        }
        let remaining = aligned.count_missing();
        if remaining > 0 {
            log::warn!("{} feature values could not be imputed", remaining);
        }
        aligned
    }

    /// Predict one yield per table row, in row order
    pub fn predict_table(&self, table: &FeatureTable) -> YieldResult<Vec<f64>> {
        let aligned = self.align(table);
        let predictions = self.model.predict(&aligned.to_matrix())?;
        if predictions.len() != table.n_rows() {
            return Err(YieldError::Processing(format!(
                "Model returned {} predictions for {} rows",
                predictions.len(),
                table.n_rows()
            )));
        }
        Ok(predictions)
    }

    /// Full prediction path for a set of regions in one season
    pub fn predict_regions(
        &self,
        engine: &dyn GeoEngine,
        regions: &[Region],
        year: i32,
    ) -> YieldResult<PredictionResult> {
        if year < self.config.min_prediction_year {
            return Err(YieldError::InvalidFormat(format!(
                "Prediction year {} is before {}",
                year, self.config.min_prediction_year
            )));
        }
        if regions.is_empty() {
            log::warn!("No regions selected, nothing to predict");
            return Ok(PredictionResult::default());
        }

        let window = DateWindow::for_season(year, &self.config.season)?;
        log::info!("Predicting yield for {} regions over {}", regions.len(), window);

        let roi: Vec<Geometry<f64>> = regions.iter().map(|r| r.geometry.clone()).collect();
        let mask = AreaMasker::new(&self.config).cropland_mask(&roi);
        let image = FeatureCollector::new(&self.config)
            .season_layers(&window)
            .masked_composite(&mask);

        let table = FeatureExtractor::new(self.config.scale, self.config.prediction_max_pixels)
            .extract(engine, &image, &roi)?;
        let predictions = self.predict_table(&table)?;

        let rows = regions
            .iter()
            .cloned()
            .zip(predictions)
            .map(|(region, predicted_yield)| PredictedRegion {
                region,
                predicted_yield,
            })
            .collect();
        Ok(PredictionResult { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EXPECTED_FEATURES;

    /// Echoes the first feature so row order is observable
    struct FirstFeatureModel {
        names: Vec<String>,
        means: Option<Vec<f64>>,
    }

    impl RegressionModel for FirstFeatureModel {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict(&self, features: &Array2<f64>) -> YieldResult<Vec<f64>> {
            Ok(features.column(0).to_vec())
        }

        fn training_means(&self) -> Option<&[f64]> {
            self.means.as_deref()
        }
    }

    fn predictor(means: Option<Vec<f64>>) -> YieldPredictor {
        let model = FirstFeatureModel {
            names: EXPECTED_FEATURES.iter().map(|s| s.to_string()).collect(),
            means,
        };
        YieldPredictor::new(Arc::new(model), PipelineConfig::default())
    }

    #[test]
    fn test_align_creates_missing_columns_in_model_order() {
        let table = FeatureTable::from_rows(
            vec!["Soil_OC".into(), "NDVI".into(), "unrelated".into()],
            vec![
                vec![Some(10.0), Some(0.4), Some(9.0)],
                vec![Some(12.0), None, Some(9.0)],
            ],
        )
        .unwrap();
        let p = predictor(Some(vec![0.5, 0.1, 300.0, 900.0, 11.0]));
        let aligned = p.align(&table);

        assert_eq!(aligned.columns(), &EXPECTED_FEATURES);
        assert!(aligned.is_complete());
        assert_eq!(aligned.get(1, "NDVI"), Some(0.4));
        assert_eq!(aligned.get(0, "LST_Day_1km"), Some(300.0));
        assert_eq!(aligned.get(1, "precipitation"), Some(900.0));
        assert_eq!(aligned.get(1, "Soil_OC"), Some(12.0));
    }

    #[test]
    fn test_batch_mean_imputation() {
        let table = FeatureTable::from_rows(
            vec!["NDVI".into()],
            vec![vec![Some(0.62)], vec![None]],
        )
        .unwrap();
        let aligned = predictor(None).align(&table);
        assert_eq!(aligned.get(1, "NDVI"), Some(0.62));
    }

    #[test]
    fn test_single_row_without_baseline_stays_missing() {
        let table = FeatureTable::from_rows(vec!["NDVI".into()], vec![vec![None]]).unwrap();
        let aligned = predictor(None).align(&table);
        assert_eq!(aligned.get(0, "NDVI"), None);
        assert!(!aligned.is_complete());
    }

    #[test]
    fn test_baseline_of_wrong_length_is_ignored() {
        let table = FeatureTable::from_rows(vec!["NDVI".into()], vec![vec![None]]).unwrap();
        let aligned = predictor(Some(vec![0.5])).align(&table);
        assert_eq!(aligned.get(0, "NDVI"), None);
    }

    #[test]
    fn test_predictions_keep_row_order() {
        for n in 1..=6 {
            let rows = (0..n).map(|i| vec![Some(i as f64)]).collect();
            let table = FeatureTable::from_rows(vec!["NDVI".into()], rows).unwrap();
            let out = predictor(None).predict_table(&table).unwrap();
            assert_eq!(out, (0..n).map(|i| i as f64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_missing_model_file() {
        let result = YieldPredictor::from_path("/nonexistent/model.json", PipelineConfig::default());
        assert!(matches!(result, Err(YieldError::ModelNotFound(_))));
    }

    #[test]
    fn test_year_before_minimum() {
        struct NoEngine;
        impl GeoEngine for NoEngine {
            fn reduce_regions(
                &self,
                _request: &crate::engine::ReduceRegionsRequest,
            ) -> YieldResult<crate::engine::ReduceRegionsResponse> {
                Err(YieldError::Processing("unreachable".to_string()))
            }
        }
        let region = Region {
            state: "Bihar".into(),
            district: "Patna".into(),
            block: "Danapur".into(),
            geometry: Geometry::Point(geo_types::Point::new(85.0, 25.6)),
            properties: serde_json::Map::new(),
        };
        let result = predictor(None).predict_regions(&NoEngine, &[region], 2019);
        assert!(matches!(result, Err(YieldError::InvalidFormat(_))));
    }
}
