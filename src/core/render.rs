//! Display data for predicted regions
//!
//! Nothing here draws. The functions produce the map layer, the per-region
//! labels and a bar chart description that a front end can render as-is.

use crate::engine::to_geojson;
use crate::types::{PredictionResult, YieldError, YieldResult, PREDICTED_YIELD};
use geo::Centroid;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

pub const OUTLINE_COLOR: &str = "yellow";
pub const OUTLINE_WEIGHT: u32 = 2;
pub const FILL_OPACITY: f64 = 0.0;

pub const CHART_TITLE: &str = "Distribution of Yield Across Blocks";
pub const CHART_X_TITLE: &str = "Blocks";
pub const CHART_Y_TITLE: &str = "Crop Yield (t/ha)";
pub const CHART_SERIES: &str = "Block wise Predicted Yield";
pub const CHART_OPACITY: f64 = 0.8;

/// Dashboard color scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl std::str::FromStr for Theme {
    type Err = YieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(YieldError::InvalidFormat(format!("Unknown theme '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartColors {
    pub background: String,
    pub text: String,
    pub bars: String,
}

impl Theme {
    pub fn colors(self) -> ChartColors {
        let (fg, bg) = match self {
            Theme::Light => ("black", "white"),
            Theme::Dark => ("white", "black"),
        };
        ChartColors {
            background: bg.to_string(),
            text: fg.to_string(),
            bars: fg.to_string(),
        }
    }
}

/// Text anchored at a region centroid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldLabel {
    pub block: String,
    pub lon: f64,
    pub lat: f64,
    pub text: String,
}

/// Bar chart of predicted yield per block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarChart {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub series: String,
    pub categories: Vec<String>,
    pub values: Vec<f64>,
    pub opacity: f64,
    pub theme: Theme,
    pub colors: ChartColors,
}

impl BarChart {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> YieldResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        log::info!("Chart written to: {}", path.as_ref().display());
        Ok(())
    }
}

pub const MISSING_YIELD_LABEL: &str = "n/a";

/// Label text for a yield; missing (non-finite) predictions read `n/a`,
/// matching the `null` written to the map layer
pub fn format_yield(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2} t/ha", value)
    } else {
        MISSING_YIELD_LABEL.to_string()
    }
}

/// Predicted regions as a styled FeatureCollection. Source attributes are
/// kept; `predicted_yield` is null when the model could not produce a value.
pub fn to_feature_collection(result: &PredictionResult) -> FeatureCollection {
    let features = result
        .rows
        .iter()
        .map(|row| {
            let mut properties: JsonObject = row.region.properties.clone();
            properties.insert("State".into(), JsonValue::from(row.region.state.clone()));
            properties.insert("District".into(), JsonValue::from(row.region.district.clone()));
            properties.insert("Block".into(), JsonValue::from(row.region.block.clone()));
            properties.insert(
                PREDICTED_YIELD.into(),
                serde_json::Number::from_f64(row.predicted_yield)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null),
            );
            properties.insert("color".into(), JsonValue::from(OUTLINE_COLOR));
            properties.insert("weight".into(), JsonValue::from(OUTLINE_WEIGHT));
            properties.insert("fillOpacity".into(), JsonValue::from(FILL_OPACITY));

            Feature {
                bbox: None,
                geometry: Some(to_geojson(&row.region.geometry)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn save_feature_collection<P: AsRef<Path>>(result: &PredictionResult, path: P) -> YieldResult<()> {
    let collection = to_feature_collection(result);
    std::fs::write(path.as_ref(), serde_json::to_string(&collection)?)?;
    log::info!(
        "Wrote {} predicted regions to {}",
        collection.features.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// One label per region with a centroid. Empty geometries get no label.
pub fn yield_labels(result: &PredictionResult) -> Vec<YieldLabel> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            let centroid = row.region.geometry.centroid()?;
            Some(YieldLabel {
                block: row.region.block.clone(),
                lon: centroid.x(),
                lat: centroid.y(),
                text: format_yield(row.predicted_yield),
            })
        })
        .collect()
}

pub fn bar_chart(result: &PredictionResult, theme: Theme) -> BarChart {
    BarChart {
        title: CHART_TITLE.to_string(),
        x_title: CHART_X_TITLE.to_string(),
        y_title: CHART_Y_TITLE.to_string(),
        series: CHART_SERIES.to_string(),
        categories: result.rows.iter().map(|r| r.region.block.clone()).collect(),
        values: result.yields(),
        opacity: CHART_OPACITY,
        theme,
        colors: theme.colors(),
    }
}
