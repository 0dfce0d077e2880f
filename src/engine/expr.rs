//! Serializable description of server-side image computations
//!
//! Nothing here touches pixels. An [`ImageExpr`] is built client-side, shipped
//! to whichever [`GeoEngine`](super::GeoEngine) is in use and evaluated there.

use crate::types::{DateWindow, YieldError, YieldResult};
use chrono::NaiveDate;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};

/// Per-pixel (or per-region) aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reducer {
    Mean,
    Sum,
    /// Population standard deviation; output bands gain a `_stdDev` suffix
    StdDev,
    First,
}

impl Reducer {
    /// Name of the band produced when this reducer is applied to `band`
    pub fn output_band(&self, band: &str) -> String {
        match self {
            Reducer::StdDev => format!("{}_stdDev", band),
            _ => band.to_string(),
        }
    }

    /// Reduce a list of valid (non-missing) values. Returns NaN for an empty list.
    pub fn apply(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        match self {
            Reducer::Mean => values.iter().sum::<f64>() / n,
            Reducer::Sum => values.iter().sum(),
            Reducer::StdDev => {
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
                variance.sqrt()
            }
            Reducer::First => values[0],
        }
    }
}

/// One step of an image-collection pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CollectionOp {
    /// Keep scenes dated in `[start, end)`
    FilterDate { start: NaiveDate, end: NaiveDate },
    /// Keep scenes whose metadata `property` is strictly below `value`
    FilterLt { property: String, value: f64 },
    Select { bands: Vec<String> },
    /// Append `(first - second) / (first + second)` to every scene as band `name`
    AddNormalizedDifference {
        first: String,
        second: String,
        name: String,
    },
}

/// A named collection followed by a pipeline of filters and band operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionExpr {
    pub id: String,
    #[serde(default)]
    pub ops: Vec<CollectionOp>,
}

impl CollectionExpr {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ops: Vec::new(),
        }
    }

    pub fn filter_date(mut self, window: &DateWindow) -> Self {
        self.ops.push(CollectionOp::FilterDate {
            start: window.start,
            end: window.end,
        });
        self
    }

    pub fn filter_lt(mut self, property: impl Into<String>, value: f64) -> Self {
        self.ops.push(CollectionOp::FilterLt {
            property: property.into(),
            value,
        });
        self
    }

    pub fn select<S: AsRef<str>>(mut self, bands: &[S]) -> Self {
        self.ops.push(CollectionOp::Select {
            bands: bands.iter().map(|b| b.as_ref().to_string()).collect(),
        });
        self
    }

    pub fn add_normalized_difference(
        mut self,
        first: impl Into<String>,
        second: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.ops.push(CollectionOp::AddNormalizedDifference {
            first: first.into(),
            second: second.into(),
            name: name.into(),
        });
        self
    }

    pub fn reduce(self, reducer: Reducer) -> ImageExpr {
        ImageExpr::Reduce {
            collection: self,
            reducer,
        }
    }

    pub fn mean(self) -> ImageExpr {
        self.reduce(Reducer::Mean)
    }

    pub fn sum(self) -> ImageExpr {
        self.reduce(Reducer::Sum)
    }

    pub fn std_dev(self) -> ImageExpr {
        self.reduce(Reducer::StdDev)
    }

    pub fn first(self) -> ImageExpr {
        self.reduce(Reducer::First)
    }
}

/// Expression tree describing a multi-band image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ImageExpr {
    /// A static image asset
    Image { id: String },
    Reduce {
        collection: CollectionExpr,
        reducer: Reducer,
    },
    Select {
        image: Box<ImageExpr>,
        bands: Vec<String>,
    },
    Rename {
        image: Box<ImageExpr>,
        names: Vec<String>,
    },
    /// Single band `nd`
    NormalizedDifference {
        image: Box<ImageExpr>,
        first: String,
        second: String,
    },
    Multiply { image: Box<ImageExpr>, factor: f64 },
    /// 1 where the pixel equals `value`, 0 elsewhere
    Eq { image: Box<ImageExpr>, value: f64 },
    /// Marks zero pixels absent
    SelfMask { image: Box<ImageExpr> },
    /// Present wherever either side is present; 1 where either side is non-zero
    Or {
        left: Box<ImageExpr>,
        right: Box<ImageExpr>,
    },
    /// Marks pixels absent wherever `mask` is absent or zero
    UpdateMask {
        image: Box<ImageExpr>,
        mask: Box<ImageExpr>,
    },
    Clip {
        image: Box<ImageExpr>,
        region: Vec<geojson::Geometry>,
    },
    Cat { images: Vec<ImageExpr> },
}

impl ImageExpr {
    pub fn image(id: impl Into<String>) -> Self {
        ImageExpr::Image { id: id.into() }
    }

    pub fn cat(images: Vec<ImageExpr>) -> Self {
        ImageExpr::Cat { images }
    }

    pub fn select(self, band: impl Into<String>) -> Self {
        ImageExpr::Select {
            image: Box::new(self),
            bands: vec![band.into()],
        }
    }

    pub fn rename(self, name: impl Into<String>) -> Self {
        ImageExpr::Rename {
            image: Box::new(self),
            names: vec![name.into()],
        }
    }

    pub fn normalized_difference(self, first: impl Into<String>, second: impl Into<String>) -> Self {
        ImageExpr::NormalizedDifference {
            image: Box::new(self),
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn multiply(self, factor: f64) -> Self {
        ImageExpr::Multiply {
            image: Box::new(self),
            factor,
        }
    }

    pub fn eq_value(self, value: f64) -> Self {
        ImageExpr::Eq {
            image: Box::new(self),
            value,
        }
    }

    pub fn self_mask(self) -> Self {
        ImageExpr::SelfMask {
            image: Box::new(self),
        }
    }

    pub fn or(self, other: ImageExpr) -> Self {
        ImageExpr::Or {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn update_mask(self, mask: ImageExpr) -> Self {
        ImageExpr::UpdateMask {
            image: Box::new(self),
            mask: Box::new(mask),
        }
    }

    pub fn clip(self, region: &[Geometry<f64>]) -> Self {
        ImageExpr::Clip {
            image: Box::new(self),
            region: to_geojson_all(region),
        }
    }
}

/// Aggregate an image over each geometry in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceRegionsRequest {
    pub image: ImageExpr,
    pub geometries: Vec<geojson::Geometry>,
    pub reducer: Reducer,
    /// Nominal pixel scale in meters
    pub scale: f64,
    /// Upper bound on pixels visited per geometry
    pub max_pixels: u64,
}

/// One reduced geometry: band name to value, `null` where nothing was valid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReducedFeature {
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Reduction results, one feature per request geometry in request order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReduceRegionsResponse {
    pub features: Vec<ReducedFeature>,
}

pub fn to_geojson(geometry: &Geometry<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(geometry))
}

pub fn to_geojson_all(geometries: &[Geometry<f64>]) -> Vec<geojson::Geometry> {
    geometries.iter().map(to_geojson).collect()
}

pub fn from_geojson(geometry: &geojson::Geometry) -> YieldResult<Geometry<f64>> {
    Geometry::<f64>::try_from(geometry.value.clone())
        .map_err(|e| YieldError::InvalidFormat(format!("Unsupported GeoJSON geometry: {}", e)))
}
