//! Pipeline configuration
//!
//! Every constant the feature pipeline depends on lives here so a deployment
//! can point at different datasets or a different compute service without a
//! rebuild. All fields default to the values the published model was trained
//! with.

use crate::types::{SeasonWindow, YieldResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identifiers of the remote raster datasets and the bands read from them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetCatalog {
    /// Surface-reflectance optical collection (Sentinel-2 harmonized)
    pub optical: String,
    pub optical_bands: Vec<String>,
    pub nir_band: String,
    pub red_band: String,
    /// Per-scene cloud-cover property used by the cloud filter
    pub cloud_property: String,
    /// 8-day land-surface temperature composite (MODIS)
    pub thermal: String,
    pub thermal_band: String,
    /// Daily rainfall (CHIRPS)
    pub rainfall: String,
    pub rainfall_band: String,
    /// Static soil organic carbon image (OpenLandMap)
    pub soil: String,
    pub soil_band: String,
    /// Two successive versions of the global land-cover classification
    pub landcover_v1: String,
    pub landcover_v2: String,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self {
            optical: "COPERNICUS/S2_SR_HARMONIZED".to_string(),
            optical_bands: vec!["B2".into(), "B3".into(), "B4".into(), "B8".into()],
            nir_band: "B8".to_string(),
            red_band: "B4".to_string(),
            cloud_property: "CLOUDY_PIXEL_PERCENTAGE".to_string(),
            thermal: "MODIS/061/MOD11A2".to_string(),
            thermal_band: "LST_Day_1km".to_string(),
            rainfall: "UCSB-CHG/CHIRPS/DAILY".to_string(),
            rainfall_band: "precipitation".to_string(),
            soil: "OpenLandMap/SOL/SOL_ORGANIC-CARBON_USDA-6A1C_M/v02".to_string(),
            soil_band: "b0".to_string(),
            landcover_v1: "ESA/WorldCover/v100".to_string(),
            landcover_v2: "ESA/WorldCover/v200".to_string(),
        }
    }
}

/// Remote compute service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    /// `None` waits for the service indefinitely
    pub timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: None,
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub datasets: DatasetCatalog,
    pub season: SeasonWindow,
    /// Scenes with cloud cover at or above this percentage are discarded
    pub cloud_threshold: f64,
    /// Raw LST digital number to Kelvin
    pub lst_scale: f64,
    /// Land-cover class code for cropland
    pub cropland_class: f64,
    /// Aggregation scale in meters
    pub scale: f64,
    pub prediction_max_pixels: u64,
    pub training_max_pixels: u64,
    pub min_prediction_year: i32,
    pub n_trees: usize,
    pub seed: u64,
    pub test_fraction: f64,
    pub service: ServiceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            datasets: DatasetCatalog::default(),
            season: SeasonWindow::KHARIF,
            cloud_threshold: 20.0,
            lst_scale: 0.02,
            cropland_class: 40.0,
            scale: 30.0,
            prediction_max_pixels: 10_000_000_000_000,
            training_max_pixels: 1_000_000_000,
            min_prediction_year: 2023,
            n_trees: 150,
            seed: 42,
            test_fraction: 0.2,
            service: ServiceConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file; absent fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> YieldResult<Self> {
        log::info!("Reading pipeline configuration: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"n_trees": 10, "service": {"base_url": "http://gee.local"}}"#)
                .unwrap();
        assert_eq!(config.n_trees, 10);
        assert_eq!(config.service.base_url, "http://gee.local");
        assert_eq!(config.service.timeout_secs, None);
        assert_eq!(config.seed, 42);
        assert_eq!(config.cropland_class, 40.0);
        assert_eq!(config.datasets.nir_band, "B8");
        assert_eq!(config.season, SeasonWindow::KHARIF);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cloud_threshold": 10.0}"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.cloud_threshold, 10.0);
        assert_eq!(config.lst_scale, 0.02);
    }
}
