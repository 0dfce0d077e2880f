//! Synthetic 20x20 catalog shared by the integration tests
//!
//! Grid: lon 85.0..85.2, lat 25.8..26.0, 0.01 degree pixels.
//! - NDVI depends on the column only: `(0.2 + 0.02c) / (0.4 + 0.02c)`
//! - LST raw value `15000 + 10r`, so scaled LST is `300 + 0.2r`
//! - rainfall 10 mm on three days inside the 2024 kharif window, plus one
//!   heavy day outside it
//! - cropland: columns 0..10 in the first land-cover version, rows 0..5 in
//!   the second

#![allow(dead_code)]

use chrono::NaiveDate;
use cropyield::engine::{GridSpec, LocalCatalog, LocalEngine, Raster, Scene};
use cropyield::{PipelineConfig, Region};
use geo_types::{Geometry, Rect};
use ndarray::Array2;

pub const WEST: f64 = 85.0;
pub const NORTH: f64 = 26.0;
pub const PIXEL: f64 = 0.01;
pub const SIZE: usize = 20;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn by_pixel(f: impl Fn(usize, usize) -> f32) -> Array2<f32> {
    Array2::from_shape_fn((SIZE, SIZE), |(r, c)| f(r, c))
}

/// Per-pixel NDVI at column `c`, as the engine computes it
pub fn ndvi_at(col: usize) -> f64 {
    let nir = 0.3f32 + 0.02 * col as f32;
    let red = 0.1f32;
    f64::from((nir - red) / (nir + red))
}

/// Center of pixel `(row, col)` as `(lon, lat)`
pub fn pixel_center(row: usize, col: usize) -> (f64, f64) {
    (
        WEST + (col as f64 + 0.5) * PIXEL,
        NORTH - (row as f64 + 0.5) * PIXEL,
    )
}

pub fn engine(config: &PipelineConfig) -> LocalEngine {
    let ds = &config.datasets;
    let mut catalog = LocalCatalog::new(GridSpec::new(WEST, NORTH, PIXEL, SIZE, SIZE));

    let optical = || {
        Raster::new()
            .with_band("B2", Array2::from_elem((SIZE, SIZE), 0.04))
            .with_band("B3", Array2::from_elem((SIZE, SIZE), 0.06))
            .with_band("B4", Array2::from_elem((SIZE, SIZE), 0.1))
            .with_band("B8", by_pixel(|_, c| 0.3 + 0.02 * c as f32))
    };
    for (date, cloud) in [(day(2024, 6, 15), 3.0), (day(2024, 7, 20), 12.0)] {
        catalog
            .add_scene(
                &ds.optical,
                Scene::new(date, optical()).with_property(&ds.cloud_property, cloud),
            )
            .unwrap();
    }
    // Cloudy scene with a very different signal; must be filtered out
    let cloudy = Raster::new()
        .with_band("B2", Array2::from_elem((SIZE, SIZE), 0.3))
        .with_band("B3", Array2::from_elem((SIZE, SIZE), 0.3))
        .with_band("B4", Array2::from_elem((SIZE, SIZE), 0.5))
        .with_band("B8", Array2::from_elem((SIZE, SIZE), 0.5));
    catalog
        .add_scene(
            &ds.optical,
            Scene::new(day(2024, 8, 1), cloudy).with_property(&ds.cloud_property, 85.0),
        )
        .unwrap();

    catalog
        .add_scene(
            &ds.thermal,
            Scene::new(
                day(2024, 7, 3),
                Raster::new().with_band(&ds.thermal_band, by_pixel(|r, _| 15000.0 + 10.0 * r as f32)),
            ),
        )
        .unwrap();

    for date in [day(2024, 6, 1), day(2024, 7, 10), day(2024, 9, 15), day(2024, 9, 16)] {
        let amount = if date == day(2024, 9, 16) { 500.0 } else { 10.0 };
        catalog
            .add_scene(
                &ds.rainfall,
                Scene::new(
                    date,
                    Raster::new().with_band(&ds.rainfall_band, Array2::from_elem((SIZE, SIZE), amount)),
                ),
            )
            .unwrap();
    }

    catalog
        .add_image(
            &ds.soil,
            Raster::new().with_band(&ds.soil_band, by_pixel(|_, c| 10.0 + 0.5 * c as f32)),
        )
        .unwrap();

    let cropland = config.cropland_class as f32;
    catalog
        .add_scene(
            &ds.landcover_v1,
            Scene::new(
                day(2020, 1, 1),
                Raster::new().with_band("Map", by_pixel(|_, c| if c < 10 { cropland } else { 10.0 })),
            ),
        )
        .unwrap();
    catalog
        .add_scene(
            &ds.landcover_v2,
            Scene::new(
                day(2021, 1, 1),
                Raster::new().with_band("Map", by_pixel(|r, _| if r < 5 { cropland } else { 50.0 })),
            ),
        )
        .unwrap();

    LocalEngine::new(catalog)
}

/// Rectangular block covering pixel rows `rows` and columns `cols`
pub fn block(name: &str, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Region {
    let west = WEST + cols.start as f64 * PIXEL;
    let east = WEST + cols.end as f64 * PIXEL;
    let north = NORTH - rows.start as f64 * PIXEL;
    let south = NORTH - rows.end as f64 * PIXEL;
    Region {
        state: "Bihar".to_string(),
        district: "Patna".to_string(),
        block: name.to_string(),
        geometry: Geometry::Polygon(Rect::new((west, south), (east, north)).to_polygon()),
        properties: serde_json::Map::new(),
    }
}
