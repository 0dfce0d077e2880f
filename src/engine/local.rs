//! In-process evaluation of image expressions over `ndarray` rasters
//!
//! The local engine holds a catalog of dated scenes and static images on a
//! single regular lon/lat grid. Absent (masked) pixels are stored as `NaN` and
//! every operation propagates them, so a reduction over an empty scene set or
//! a fully masked region comes out as missing rather than zero.
//!
//! Evaluation happens at the grid's native resolution; the request `scale`
//! is not used for resampling.

use super::expr::{
    from_geojson, CollectionExpr, CollectionOp, ImageExpr, ReduceRegionsRequest,
    ReduceRegionsResponse, ReducedFeature, Reducer,
};
use super::GeoEngine;
use crate::types::{YieldError, YieldResult};
use chrono::NaiveDate;
use geo::{BoundingRect, Contains};
use geo_types::{Geometry, Point, Rect};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// Regular lon/lat pixel grid, row 0 at the northern edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub west: f64,
    pub north: f64,
    /// Pixel edge length in degrees
    pub pixel_size: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn new(west: f64, north: f64, pixel_size: f64, rows: usize, cols: usize) -> Self {
        Self {
            west,
            north,
            pixel_size,
            rows,
            cols,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Center of pixel `(row, col)` as `(lon, lat)`
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.west + (col as f64 + 0.5) * self.pixel_size,
            self.north - (row as f64 + 0.5) * self.pixel_size,
        )
    }

    /// Pixel containing `(lon, lat)`, if inside the grid
    pub fn locate(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let col = ((lon - self.west) / self.pixel_size).floor();
        let row = ((self.north - lat) / self.pixel_size).floor();
        if col < 0.0 || row < 0.0 || !col.is_finite() || !row.is_finite() {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        if row < self.rows && col < self.cols {
            Some((row, col))
        } else {
            None
        }
    }

    /// Row and column ranges of the pixels overlapping `rect`
    pub fn window(&self, rect: &Rect<f64>) -> (Range<usize>, Range<usize>) {
        let clamp = |v: f64, max: usize| -> usize {
            if v <= 0.0 {
                0
            } else {
                (v as usize).min(max)
            }
        };
        let c0 = clamp(((rect.min().x - self.west) / self.pixel_size).floor(), self.cols);
        let c1 = clamp(((rect.max().x - self.west) / self.pixel_size).floor() + 1.0, self.cols);
        let r0 = clamp(((self.north - rect.max().y) / self.pixel_size).floor(), self.rows);
        let r1 = clamp(((self.north - rect.min().y) / self.pixel_size).floor() + 1.0, self.rows);
        (r0..r1.max(r0), c0..c1.max(c0))
    }
}

/// Ordered set of named bands sharing one grid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Raster {
    bands: Vec<(String, Array2<f32>)>,
}

impl Raster {
    pub fn new() -> Self {
        Self { bands: Vec::new() }
    }

    pub fn with_band(mut self, name: impl Into<String>, data: Array2<f32>) -> Self {
        self.set_band(name, data);
        self
    }

    /// Insert or replace a band
    pub fn set_band(&mut self, name: impl Into<String>, data: Array2<f32>) {
        let name = name.into();
        match self.bands.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = data,
            None => self.bands.push((name, data)),
        }
    }

    pub fn band(&self, name: &str) -> Option<&Array2<f32>> {
        self.bands.iter().find(|(n, _)| n == name).map(|(_, b)| b)
    }

    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn bands(&self) -> impl Iterator<Item = (&str, &Array2<f32>)> {
        self.bands.iter().map(|(n, b)| (n.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    fn first_band(&self) -> YieldResult<&Array2<f32>> {
        self.bands
            .first()
            .map(|(_, b)| b)
            .ok_or_else(|| YieldError::Processing("Image has no bands".to_string()))
    }

    fn require(&self, name: &str) -> YieldResult<&Array2<f32>> {
        self.band(name).ok_or_else(|| {
            YieldError::Processing(format!(
                "Band '{}' not found (available: {:?})",
                name,
                self.band_names()
            ))
        })
    }

    fn map_bands<F>(&self, f: F) -> Raster
    where
        F: Fn(f32) -> f32,
    {
        Raster {
            bands: self
                .bands
                .iter()
                .map(|(n, b)| (n.clone(), b.mapv(&f)))
                .collect(),
        }
    }
}

/// One dated acquisition in an image collection
#[derive(Debug, Clone)]
pub struct Scene {
    pub date: NaiveDate,
    pub properties: HashMap<String, f64>,
    pub raster: Raster,
}

impl Scene {
    pub fn new(date: NaiveDate, raster: Raster) -> Self {
        Self {
            date,
            properties: HashMap::new(),
            raster,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

/// Collections and static images available to a [`LocalEngine`]
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    grid: GridSpec,
    collections: HashMap<String, Vec<Scene>>,
    images: HashMap<String, Raster>,
}

impl LocalCatalog {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            collections: HashMap::new(),
            images: HashMap::new(),
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Register a collection, possibly with no scenes yet
    pub fn add_collection(&mut self, id: impl Into<String>) {
        self.collections.entry(id.into()).or_default();
    }

    pub fn add_scene(&mut self, id: impl Into<String>, scene: Scene) -> YieldResult<()> {
        let id = id.into();
        self.check_shape(&id, &scene.raster)?;
        self.collections.entry(id).or_default().push(scene);
        Ok(())
    }

    pub fn add_image(&mut self, id: impl Into<String>, raster: Raster) -> YieldResult<()> {
        let id = id.into();
        self.check_shape(&id, &raster)?;
        self.images.insert(id, raster);
        Ok(())
    }

    fn check_shape(&self, id: &str, raster: &Raster) -> YieldResult<()> {
        for (name, band) in raster.bands() {
            if band.dim() != self.grid.shape() {
                return Err(YieldError::InvalidFormat(format!(
                    "Band '{}' of '{}' has shape {:?}, grid is {:?}",
                    name,
                    id,
                    band.dim(),
                    self.grid.shape()
                )));
            }
        }
        Ok(())
    }
}

/// Geospatial engine evaluating expressions against a [`LocalCatalog`]
pub struct LocalEngine {
    catalog: LocalCatalog,
}

impl LocalEngine {
    pub fn new(catalog: LocalCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &LocalCatalog {
        &self.catalog
    }

    /// Evaluate an expression to a full-grid raster
    pub fn evaluate(&self, expr: &ImageExpr) -> YieldResult<Raster> {
        match expr {
            ImageExpr::Image { id } => self
                .catalog
                .images
                .get(id)
                .cloned()
                .ok_or_else(|| YieldError::UnknownAsset(id.clone())),
            ImageExpr::Reduce {
                collection,
                reducer,
            } => self.reduce_collection(collection, *reducer),
            ImageExpr::Select { image, bands } => {
                let source = self.evaluate(image)?;
                let mut out = Raster::new();
                for band in bands {
                    out.set_band(band.clone(), source.require(band)?.clone());
                }
                Ok(out)
            }
            ImageExpr::Rename { image, names } => {
                let source = self.evaluate(image)?;
                if names.len() != source.len() {
                    return Err(YieldError::Processing(format!(
                        "Cannot rename {} bands to {} names",
                        source.len(),
                        names.len()
                    )));
                }
                Ok(Raster {
                    bands: source
                        .bands
                        .into_iter()
                        .zip(names)
                        .map(|((_, b), n)| (n.clone(), b))
                        .collect(),
                })
            }
            ImageExpr::NormalizedDifference {
                image,
                first,
                second,
            } => {
                let source = self.evaluate(image)?;
                let nd = normalized_difference(source.require(first)?, source.require(second)?);
                Ok(Raster::new().with_band("nd", nd))
            }
            ImageExpr::Multiply { image, factor } => {
                let factor = *factor as f32;
                Ok(self.evaluate(image)?.map_bands(|v| v * factor))
            }
            ImageExpr::Eq { image, value } => {
                let value = *value as f32;
                Ok(self.evaluate(image)?.map_bands(|v| {
                    if v.is_nan() {
                        f32::NAN
                    } else if v == value {
                        1.0
                    } else {
                        0.0
                    }
                }))
            }
            ImageExpr::SelfMask { image } => Ok(self
                .evaluate(image)?
                .map_bands(|v| if v == 0.0 { f32::NAN } else { v })),
            ImageExpr::Or { left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                let name = left.bands[..]
                    .first()
                    .map(|(n, _)| n.clone())
                    .ok_or_else(|| YieldError::Processing("Image has no bands".to_string()))?;
                let mut out = Array2::<f32>::zeros(self.catalog.grid.shape());
                Zip::from(&mut out)
                    .and(left.first_band()?)
                    .and(right.first_band()?)
                    .for_each(|o, &l, &r| {
                        *o = match (l.is_nan(), r.is_nan()) {
                            (true, true) => f32::NAN,
                            _ => {
                                if (!l.is_nan() && l != 0.0) || (!r.is_nan() && r != 0.0) {
                                    1.0
                                } else {
                                    0.0
                                }
                            }
                        };
                    });
                Ok(Raster::new().with_band(name, out))
            }
            ImageExpr::UpdateMask { image, mask } => {
                let mut source = self.evaluate(image)?;
                let mask = self.evaluate(mask)?;
                let mask = mask.first_band()?;
                for (_, band) in source.bands.iter_mut() {
                    Zip::from(band).and(mask).for_each(|v, &m| {
                        if m.is_nan() || m == 0.0 {
                            *v = f32::NAN;
                        }
                    });
                }
                Ok(source)
            }
            ImageExpr::Clip { image, region } => {
                let mut source = self.evaluate(image)?;
                let mut inside = Array2::from_elem(self.catalog.grid.shape(), false);
                for geometry in region {
                    let geometry = from_geojson(geometry)?;
                    for (row, col) in self.covered_pixels(&geometry)? {
                        inside[[row, col]] = true;
                    }
                }
                for (_, band) in source.bands.iter_mut() {
                    Zip::from(band).and(&inside).for_each(|v, &keep| {
                        if !keep {
                            *v = f32::NAN;
                        }
                    });
                }
                Ok(source)
            }
            ImageExpr::Cat { images } => {
                let mut out = Raster::new();
                for image in images {
                    for (name, band) in self.evaluate(image)?.bands {
                        if out.band(&name).is_some() {
                            return Err(YieldError::Processing(format!(
                                "Duplicate band '{}' in concatenation",
                                name
                            )));
                        }
                        out.bands.push((name, band));
                    }
                }
                Ok(out)
            }
        }
    }

    fn reduce_collection(&self, expr: &CollectionExpr, reducer: Reducer) -> YieldResult<Raster> {
        let source = self
            .catalog
            .collections
            .get(&expr.id)
            .ok_or_else(|| YieldError::UnknownAsset(expr.id.clone()))?;

        let mut band_names: Vec<String> = source
            .first()
            .map(|s| s.raster.band_names())
            .unwrap_or_default();
        let mut scenes: Vec<Scene> = source.clone();

        for op in &expr.ops {
            match op {
                CollectionOp::FilterDate { start, end } => {
                    scenes.retain(|s| s.date >= *start && s.date < *end);
                }
                CollectionOp::FilterLt { property, value } => {
                    scenes.retain(|s| s.properties.get(property).map_or(false, |v| v < value));
                }
                CollectionOp::Select { bands } => {
                    for scene in scenes.iter_mut() {
                        let mut selected = Raster::new();
                        for band in bands {
                            selected.set_band(band.clone(), scene.raster.require(band)?.clone());
                        }
                        scene.raster = selected;
                    }
                    band_names = bands.clone();
                }
                CollectionOp::AddNormalizedDifference {
                    first,
                    second,
                    name,
                } => {
                    for scene in scenes.iter_mut() {
                        let nd = normalized_difference(
                            scene.raster.require(first)?,
                            scene.raster.require(second)?,
                        );
                        scene.raster.set_band(name.clone(), nd);
                    }
                    if !band_names.contains(name) {
                        band_names.push(name.clone());
                    }
                }
            }
        }

        log::debug!(
            "Collection '{}': {} of {} scenes after filtering",
            expr.id,
            scenes.len(),
            source.len()
        );

        if reducer == Reducer::First {
            return scenes
                .into_iter()
                .next()
                .map(|s| s.raster)
                .ok_or_else(|| YieldError::EmptyCollection(expr.id.clone()));
        }

        let (rows, cols) = self.catalog.grid.shape();
        let mut out = Raster::new();
        let mut values = Vec::with_capacity(scenes.len());
        for band in &band_names {
            let stack = scenes
                .iter()
                .map(|s| s.raster.require(band))
                .collect::<YieldResult<Vec<_>>>()?;
            let mut reduced = Array2::<f32>::from_elem((rows, cols), f32::NAN);
            for ((row, col), cell) in reduced.indexed_iter_mut() {
                values.clear();
                values.extend(
                    stack
                        .iter()
                        .map(|b| b[[row, col]])
                        .filter(|v| !v.is_nan())
                        .map(f64::from),
                );
                *cell = reducer.apply(&values) as f32;
            }
            out.set_band(reducer.output_band(band), reduced);
        }
        Ok(out)
    }

    /// Pixels a geometry covers: the containing pixel for points, pixels whose
    /// centers fall inside for areal geometries
    fn covered_pixels(&self, geometry: &Geometry<f64>) -> YieldResult<Vec<(usize, usize)>> {
        let grid = &self.catalog.grid;
        match geometry {
            Geometry::Point(p) => Ok(grid.locate(p.x(), p.y()).into_iter().collect()),
            Geometry::MultiPoint(mp) => Ok(mp
                .iter()
                .filter_map(|p| grid.locate(p.x(), p.y()))
                .collect()),
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => {
                let Some(rect) = geometry.bounding_rect() else {
                    return Ok(Vec::new());
                };
                let (rows, cols) = grid.window(&rect);
                let mut pixels = Vec::new();
                for row in rows {
                    for col in cols.clone() {
                        let (lon, lat) = grid.pixel_center(row, col);
                        if areal_contains(geometry, &Point::new(lon, lat)) {
                            pixels.push((row, col));
                        }
                    }
                }
                Ok(pixels)
            }
            Geometry::GeometryCollection(gc) => {
                let mut pixels = Vec::new();
                for g in gc.iter() {
                    for px in self.covered_pixels(g)? {
                        if !pixels.contains(&px) {
                            pixels.push(px);
                        }
                    }
                }
                Ok(pixels)
            }
            other => Err(YieldError::InvalidFormat(format!(
                "Cannot aggregate over geometry {:?}",
                other
            ))),
        }
    }

    /// Pixels examined for a geometry before containment tests
    fn candidate_pixels(&self, geometry: &Geometry<f64>) -> u64 {
        match geometry {
            Geometry::Point(_) => 1,
            Geometry::MultiPoint(mp) => mp.0.len() as u64,
            _ => geometry
                .bounding_rect()
                .map(|rect| {
                    let (rows, cols) = self.catalog.grid.window(&rect);
                    (rows.len() * cols.len()) as u64
                })
                .unwrap_or(0),
        }
    }
}

impl GeoEngine for LocalEngine {
    fn reduce_regions(&self, request: &ReduceRegionsRequest) -> YieldResult<ReduceRegionsResponse> {
        let image = self.evaluate(&request.image)?;
        log::debug!(
            "Reducing {} bands over {} geometries",
            image.len(),
            request.geometries.len()
        );

        let mut features = Vec::with_capacity(request.geometries.len());
        let mut values = Vec::new();
        for (index, geometry) in request.geometries.iter().enumerate() {
            let geometry = from_geojson(geometry)?;
            let candidates = self.candidate_pixels(&geometry);
            if candidates > request.max_pixels {
                return Err(YieldError::TooManyPixels {
                    geometry: index,
                    pixels: candidates,
                    max_pixels: request.max_pixels,
                });
            }

            let pixels = self.covered_pixels(&geometry)?;
            let mut properties = serde_json::Map::new();
            for (name, band) in image.bands() {
                values.clear();
                values.extend(
                    pixels
                        .iter()
                        .map(|&(r, c)| band[[r, c]])
                        .filter(|v| !v.is_nan())
                        .map(f64::from),
                );
                let reduced = request.reducer.apply(&values);
                let value = serde_json::Number::from_f64(reduced)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null);
                properties.insert(name.to_string(), value);
            }
            features.push(ReducedFeature { properties });
        }

        Ok(ReduceRegionsResponse { features })
    }
}

/// `(a - b) / (a + b)`, absent where either input is absent or the sum is zero
pub fn normalized_difference(a: &Array2<f32>, b: &Array2<f32>) -> Array2<f32> {
    let mut out = Array2::<f32>::from_elem(a.dim(), f32::NAN);
    Zip::from(&mut out).and(a).and(b).for_each(|o, &a, &b| {
        let sum = a + b;
        if !a.is_nan() && !b.is_nan() && sum != 0.0 {
            *o = (a - b) / sum;
        }
    });
    out
}

fn areal_contains(geometry: &Geometry<f64>, point: &Point<f64>) -> bool {
    match geometry {
        Geometry::Polygon(p) => p.contains(point),
        Geometry::MultiPolygon(mp) => mp.contains(point),
        Geometry::Rect(r) => r.to_polygon().contains(point),
        Geometry::Triangle(t) => t.to_polygon().contains(point),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::expr::to_geojson;
    use approx::assert_relative_eq;
    use geo_types::polygon;

    fn grid() -> GridSpec {
        // 4x4 pixels of 0.1 degree covering lon 80.0..80.4, lat 20.0..20.4
        GridSpec::new(80.0, 20.4, 0.1, 4, 4)
    }

    fn constant(value: f32) -> Array2<f32> {
        Array2::from_elem((4, 4), value)
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn test_grid_locate_and_window() {
        let g = grid();
        assert_eq!(g.locate(80.05, 20.35), Some((0, 0)));
        assert_eq!(g.locate(80.35, 20.05), Some((3, 3)));
        assert_eq!(g.locate(79.9, 20.1), None);
        assert_eq!(g.locate(80.1, 20.5), None);

        let rect = Rect::new((80.12, 20.12), (80.28, 20.28));
        let (rows, cols) = g.window(&rect);
        assert_eq!(rows, 1..3);
        assert_eq!(cols, 1..3);
    }

    #[test]
    fn test_empty_window_reduces_to_missing() {
        let mut catalog = LocalCatalog::new(grid());
        catalog
            .add_scene("S2", Scene::new(day(1, 15), Raster::new().with_band("B8", constant(0.5))))
            .unwrap();
        let engine = LocalEngine::new(catalog);

        let window = crate::types::DateWindow::kharif(2024).unwrap();
        let expr = CollectionExpr::new("S2").filter_date(&window).select(&["B8"]).mean();
        let raster = engine.evaluate(&expr).unwrap();
        let band = raster.band("B8").unwrap();
        assert!(band.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_first_of_empty_collection_fails() {
        let mut catalog = LocalCatalog::new(grid());
        catalog.add_collection("LC");
        let engine = LocalEngine::new(catalog);
        let result = engine.evaluate(&CollectionExpr::new("LC").first());
        assert!(matches!(result, Err(YieldError::EmptyCollection(_))));
    }

    #[test]
    fn test_unknown_asset() {
        let engine = LocalEngine::new(LocalCatalog::new(grid()));
        assert!(matches!(
            engine.evaluate(&ImageExpr::image("missing")),
            Err(YieldError::UnknownAsset(_))
        ));
    }

    #[test]
    fn test_per_scene_normalized_difference() {
        let mut catalog = LocalCatalog::new(grid());
        let scene_a = Raster::new()
            .with_band("B8", constant(0.6))
            .with_band("B4", constant(0.2));
        let scene_b = Raster::new()
            .with_band("B8", constant(0.3))
            .with_band("B4", constant(0.3));
        catalog.add_scene("S2", Scene::new(day(7, 1), scene_a)).unwrap();
        catalog.add_scene("S2", Scene::new(day(7, 11), scene_b)).unwrap();
        let engine = LocalEngine::new(catalog);

        let ndvi = CollectionExpr::new("S2")
            .add_normalized_difference("B8", "B4", "NDVI")
            .select(&["NDVI"]);
        let mean = engine.evaluate(&ndvi.clone().mean()).unwrap();
        let std = engine.evaluate(&ndvi.std_dev()).unwrap();

        // scene a: 0.4/0.8 = 0.5, scene b: 0.0
        assert_relative_eq!(mean.band("NDVI").unwrap()[[0, 0]], 0.25, epsilon = 1e-6);
        assert_relative_eq!(std.band("NDVI_stdDev").unwrap()[[2, 2]], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_cloud_filter_excludes_scenes_without_property() {
        let mut catalog = LocalCatalog::new(grid());
        catalog
            .add_scene(
                "S2",
                Scene::new(day(7, 1), Raster::new().with_band("B8", constant(1.0)))
                    .with_property("CLOUDY_PIXEL_PERCENTAGE", 5.0),
            )
            .unwrap();
        catalog
            .add_scene(
                "S2",
                Scene::new(day(7, 6), Raster::new().with_band("B8", constant(3.0)))
                    .with_property("CLOUDY_PIXEL_PERCENTAGE", 20.0),
            )
            .unwrap();
        catalog
            .add_scene("S2", Scene::new(day(7, 11), Raster::new().with_band("B8", constant(5.0))))
            .unwrap();
        let engine = LocalEngine::new(catalog);

        let expr = CollectionExpr::new("S2")
            .filter_lt("CLOUDY_PIXEL_PERCENTAGE", 20.0)
            .mean();
        let raster = engine.evaluate(&expr).unwrap();
        assert_eq!(raster.band("B8").unwrap()[[1, 1]], 1.0);
    }

    #[test]
    fn test_reduce_regions_ignores_masked_pixels() {
        let mut catalog = LocalCatalog::new(grid());
        let mut values = Array2::<f32>::zeros((4, 4));
        for ((r, c), v) in values.indexed_iter_mut() {
            *v = (r * 4 + c) as f32;
        }
        let mut mask = Array2::<f32>::ones((4, 4));
        mask[[1, 1]] = 0.0;
        catalog
            .add_image("img", Raster::new().with_band("v", values))
            .unwrap();
        catalog.add_image("mask", Raster::new().with_band("m", mask)).unwrap();
        let engine = LocalEngine::new(catalog);

        // covers pixel centers (1,1), (1,2), (2,1), (2,2)
        let square = Geometry::Polygon(polygon![
            (x: 80.11, y: 20.11),
            (x: 80.29, y: 20.11),
            (x: 80.29, y: 20.29),
            (x: 80.11, y: 20.29),
        ]);
        let outside = Geometry::Point(Point::new(81.0, 21.0));
        let request = ReduceRegionsRequest {
            image: ImageExpr::image("img").update_mask(ImageExpr::image("mask")),
            geometries: vec![to_geojson(&square), to_geojson(&outside)],
            reducer: Reducer::Mean,
            scale: 30.0,
            max_pixels: 1_000,
        };
        let response = engine.reduce_regions(&request).unwrap();
        assert_eq!(response.features.len(), 2);
        // (6 + 9 + 10) / 3, pixel 5 is masked
        assert_relative_eq!(
            response.features[0].properties["v"].as_f64().unwrap(),
            25.0 / 3.0,
            epsilon = 1e-9
        );
        assert!(response.features[1].properties["v"].is_null());
    }

    #[test]
    fn test_max_pixels_guard() {
        let mut catalog = LocalCatalog::new(grid());
        catalog.add_image("img", Raster::new().with_band("v", constant(1.0))).unwrap();
        let engine = LocalEngine::new(catalog);

        let everything = Geometry::Rect(Rect::new((79.0, 19.0), (81.0, 21.0)));
        let request = ReduceRegionsRequest {
            image: ImageExpr::image("img"),
            geometries: vec![to_geojson(&everything)],
            reducer: Reducer::Mean,
            scale: 30.0,
            max_pixels: 4,
        };
        assert!(matches!(
            engine.reduce_regions(&request),
            Err(YieldError::TooManyPixels { geometry: 0, pixels: 16, max_pixels: 4 })
        ));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut catalog = LocalCatalog::new(grid());
        let result = catalog.add_image("bad", Raster::new().with_band("v", Array2::zeros((2, 2))));
        assert!(result.is_err());
    }
}
