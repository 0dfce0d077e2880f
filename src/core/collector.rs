//! Seasonal composite layers from the remote raster catalog

use crate::config::PipelineConfig;
use crate::engine::{CollectionExpr, ImageExpr};
use crate::types::{
    DateWindow, BAND_LST, BAND_NDVI, BAND_NDVI_STD, BAND_PRECIPITATION, BAND_SOIL_OC,
};

/// The five feature layers for one season window
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonLayers {
    pub ndvi_mean: ImageExpr,
    pub ndvi_std: ImageExpr,
    pub lst: ImageExpr,
    pub rainfall: ImageExpr,
    pub soil: ImageExpr,
}

impl SeasonLayers {
    /// Concatenate into one five-band composite
    pub fn composite(self) -> ImageExpr {
        ImageExpr::cat(vec![
            self.ndvi_mean,
            self.ndvi_std,
            self.lst,
            self.rainfall,
            self.soil,
        ])
    }

    /// Composite with the cropland mask applied to every layer except rainfall.
    /// Rainfall is a coarse product and is aggregated over the whole region.
    pub fn masked_composite(self, mask: &ImageExpr) -> ImageExpr {
        ImageExpr::cat(vec![
            self.ndvi_mean.update_mask(mask.clone()),
            self.ndvi_std.update_mask(mask.clone()),
            self.lst.update_mask(mask.clone()),
            self.rainfall,
            self.soil.update_mask(mask.clone()),
        ])
    }
}

/// Builds time-windowed, cloud-filtered composite layers
pub struct FeatureCollector<'a> {
    config: &'a PipelineConfig,
}

impl<'a> FeatureCollector<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    fn ndvi_series(&self, window: &DateWindow) -> CollectionExpr {
        let ds = &self.config.datasets;
        CollectionExpr::new(&ds.optical)
            .filter_date(window)
            .filter_lt(&ds.cloud_property, self.config.cloud_threshold)
            .select(&ds.optical_bands)
            .add_normalized_difference(&ds.nir_band, &ds.red_band, BAND_NDVI)
            .select(&[BAND_NDVI])
    }

    /// Mean and standard deviation of per-scene NDVI over cloud-filtered scenes
    pub fn ndvi(&self, window: &DateWindow) -> (ImageExpr, ImageExpr) {
        let series = self.ndvi_series(window);
        let mean = series.clone().mean().rename(BAND_NDVI);
        let std = series.std_dev().rename(BAND_NDVI_STD);
        (mean, std)
    }

    /// Mean land-surface temperature in Kelvin
    pub fn lst(&self, window: &DateWindow) -> ImageExpr {
        let ds = &self.config.datasets;
        CollectionExpr::new(&ds.thermal)
            .filter_date(window)
            .select(&[&ds.thermal_band])
            .mean()
            .multiply(self.config.lst_scale)
            .rename(BAND_LST)
    }

    /// Total precipitation accumulated over the window
    pub fn rainfall(&self, window: &DateWindow) -> ImageExpr {
        let ds = &self.config.datasets;
        CollectionExpr::new(&ds.rainfall)
            .filter_date(window)
            .select(&[&ds.rainfall_band])
            .sum()
            .rename(BAND_PRECIPITATION)
    }

    /// Static soil organic carbon
    pub fn soil(&self) -> ImageExpr {
        let ds = &self.config.datasets;
        ImageExpr::image(&ds.soil)
            .select(&ds.soil_band)
            .rename(BAND_SOIL_OC)
    }

    pub fn season_layers(&self, window: &DateWindow) -> SeasonLayers {
        log::info!("Building feature layers for {}", window);
        let (ndvi_mean, ndvi_std) = self.ndvi(window);
        SeasonLayers {
            ndvi_mean,
            ndvi_std,
            lst: self.lst(window),
            rainfall: self.rainfall(window),
            soil: self.soil(),
        }
    }
}
