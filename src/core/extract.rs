use super::table::FeatureTable;
use crate::engine::{to_geojson_all, GeoEngine, ImageExpr, ReduceRegionsRequest, Reducer};
use crate::types::{YieldError, YieldResult};
use geo_types::Geometry;

/// Per-geometry mean reduction of a composite into a feature table
pub struct FeatureExtractor {
    pub scale: f64,
    pub max_pixels: u64,
}

impl FeatureExtractor {
    pub fn new(scale: f64, max_pixels: u64) -> Self {
        Self { scale, max_pixels }
    }

    /// One row per geometry, in input order, one column per band. A geometry
    /// with no valid pixel yields a row of missing values.
    pub fn extract(
        &self,
        engine: &dyn GeoEngine,
        image: &ImageExpr,
        geometries: &[Geometry<f64>],
    ) -> YieldResult<FeatureTable> {
        log::info!(
            "Extracting features for {} geometries at {} m",
            geometries.len(),
            self.scale
        );
        let request = ReduceRegionsRequest {
            image: image.clone(),
            geometries: to_geojson_all(geometries),
            reducer: Reducer::Mean,
            scale: self.scale,
            max_pixels: self.max_pixels,
        };
        let response = engine.reduce_regions(&request)?;
        if response.features.len() != geometries.len() {
            return Err(YieldError::InvalidFormat(format!(
                "Expected {} reduced features, got {}",
                geometries.len(),
                response.features.len()
            )));
        }

        let records: Vec<_> = response
            .features
            .into_iter()
            .map(|f| f.properties)
            .collect();
        let table = FeatureTable::from_records(&records);

        let empty_rows = table
            .rows()
            .iter()
            .filter(|r| r.iter().all(|c| c.is_none()))
            .count();
        if empty_rows > 0 {
            log::warn!("{} geometries had no valid pixels", empty_rows);
        }
        Ok(table)
    }
}
