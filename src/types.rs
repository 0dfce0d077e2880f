use chrono::{Datelike, NaiveDate};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Mean NDVI over the season window
pub const BAND_NDVI: &str = "NDVI";
/// Per-pixel standard deviation of NDVI over the season window
pub const BAND_NDVI_STD: &str = "NDVI_stdDev";
/// Mean daytime land-surface temperature (Kelvin)
pub const BAND_LST: &str = "LST_Day_1km";
/// Accumulated precipitation over the season window (mm)
pub const BAND_PRECIPITATION: &str = "precipitation";
/// Static soil organic carbon
pub const BAND_SOIL_OC: &str = "Soil_OC";

/// The five feature columns a yield model consumes, in canonical order
pub const EXPECTED_FEATURES: [&str; 5] = [
    BAND_NDVI,
    BAND_NDVI_STD,
    BAND_LST,
    BAND_PRECIPITATION,
    BAND_SOIL_OC,
];

/// Name of the column attached to prediction results
pub const PREDICTED_YIELD: &str = "predicted_yield";

/// Month/day bounds of a cropping season, independent of year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonWindow {
    pub start_month: u32,
    pub start_day: u32,
    pub end_month: u32,
    pub end_day: u32,
}

impl SeasonWindow {
    /// Kharif (monsoon-sown) season: June 1 to September 16
    pub const KHARIF: SeasonWindow = SeasonWindow {
        start_month: 6,
        start_day: 1,
        end_month: 9,
        end_day: 16,
    };
}

impl Default for SeasonWindow {
    fn default() -> Self {
        Self::KHARIF
    }
}

/// Concrete date range `[start, end)` used to filter image collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> YieldResult<Self> {
        if end <= start {
            return Err(YieldError::InvalidFormat(format!(
                "Date window end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Resolve a season for a given year
    pub fn for_season(year: i32, season: &SeasonWindow) -> YieldResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, season.start_month, season.start_day)
            .ok_or_else(|| {
                YieldError::InvalidFormat(format!(
                    "Invalid season start {}-{}-{}",
                    year, season.start_month, season.start_day
                ))
            })?;
        let end = NaiveDate::from_ymd_opt(year, season.end_month, season.end_day)
            .ok_or_else(|| {
                YieldError::InvalidFormat(format!(
                    "Invalid season end {}-{}-{}",
                    year, season.end_month, season.end_day
                ))
            })?;
        Self::new(start, end)
    }

    /// Kharif window of `year`
    pub fn kharif(year: i32) -> YieldResult<Self> {
        Self::for_season(year, &SeasonWindow::KHARIF)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// An administrative polygon the user can select and predict over
#[derive(Debug, Clone)]
pub struct Region {
    pub state: String,
    pub district: String,
    pub block: String,
    pub geometry: Geometry<f64>,
    /// Remaining attributes from the source file, carried through to outputs
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// One region with its model output
#[derive(Debug, Clone)]
pub struct PredictedRegion {
    pub region: Region,
    pub predicted_yield: f64,
}

/// Output of a prediction request, in input region order
#[derive(Debug, Clone, Default)]
pub struct PredictionResult {
    pub rows: Vec<PredictedRegion>,
}

impl PredictionResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn yields(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.predicted_yield).collect()
    }
}

/// Error types for the yield pipeline
#[derive(Debug, thiserror::Error)]
pub enum YieldError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Missing attribute '{attribute}' on feature {index}")]
    MissingAttribute { attribute: String, index: usize },

    #[error("Model not found at {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Not authenticated to the compute service: {0}")]
    NotAuthenticated(String),

    #[error("Compute service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Image collection '{0}' is empty")]
    EmptyCollection(String),

    #[error("Unknown asset '{0}'")]
    UnknownAsset(String),

    #[error("Geometry {geometry} covers {pixels} pixels, more than the limit of {max_pixels}")]
    TooManyPixels {
        geometry: usize,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for yield pipeline operations
pub type YieldResult<T> = Result<T, YieldError>;
