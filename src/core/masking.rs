use crate::config::PipelineConfig;
use crate::engine::{CollectionExpr, ImageExpr};
use geo_types::Geometry;

/// Derives the cropland mask for a region of interest
pub struct AreaMasker<'a> {
    config: &'a PipelineConfig,
}

impl<'a> AreaMasker<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Cropland class of one land-cover product, clipped to the region, with
    /// every other pixel absent
    fn cropland(&self, landcover: &str, roi: &[Geometry<f64>]) -> ImageExpr {
        CollectionExpr::new(landcover)
            .first()
            .eq_value(self.config.cropland_class)
            .clip(roi)
            .self_mask()
    }

    /// Pixels classified as cropland by either land-cover version
    pub fn cropland_mask(&self, roi: &[Geometry<f64>]) -> ImageExpr {
        let ds = &self.config.datasets;
        log::debug!(
            "Cropland mask from {} OR {} over {} geometries",
            ds.landcover_v1,
            ds.landcover_v2,
            roi.len()
        );
        self.cropland(&ds.landcover_v1, roi)
            .or(self.cropland(&ds.landcover_v2, roi))
    }
}
