//! Field-observed yield records used for training

use crate::core::table::FeatureTable;
use crate::types::{YieldError, YieldResult};
use regex::Regex;
use std::io::Read;
use std::path::Path;

pub const COLUMN_LAT: &str = "lat";
pub const COLUMN_LON: &str = "lon";
pub const COLUMN_YIELD: &str = "yield";

/// One georeferenced yield measurement (t/ha)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldObservation {
    pub lat: f64,
    pub lon: f64,
    pub observed_yield: f64,
}

/// Canonical `lat`/`lon`/`yield` table of observations, in input order
pub fn observations_table(observations: &[FieldObservation]) -> FeatureTable {
    let rows = observations
        .iter()
        .map(|o| vec![Some(o.lat), Some(o.lon), Some(o.observed_yield)])
        .collect();
    FeatureTable::from_rows(
        vec![COLUMN_LAT.into(), COLUMN_LON.into(), COLUMN_YIELD.into()],
        rows,
    )
    .unwrap_or_default()
}

/// CSV reader mapping survey column names onto canonical ones
pub struct FieldDataReader {
    lat_column: String,
    lon_column: String,
    yield_column: Option<String>,
}

impl Default for FieldDataReader {
    fn default() -> Self {
        Self {
            lat_column: "Latitude".to_string(),
            lon_column: "Longitude".to_string(),
            yield_column: None,
        }
    }
}

impl FieldDataReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit yield column instead of detecting one
    pub fn with_yield_column(mut self, name: impl Into<String>) -> Self {
        self.yield_column = Some(name.into());
        self
    }

    pub fn read_path<P: AsRef<Path>>(&self, path: P) -> YieldResult<Vec<FieldObservation>> {
        log::info!("Reading field observations: {}", path.as_ref().display());
        let file = std::fs::File::open(path)?;
        self.read(file)
    }

    /// Parse observations. Rows with a missing or unparsable key field are dropped.
    pub fn read<R: Read>(&self, input: R) -> YieldResult<Vec<FieldObservation>> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
        let headers = reader.headers()?.clone();

        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| YieldError::InvalidFormat(format!("Column '{}' not found", name)))
        };
        let lat_idx = find(&self.lat_column)?;
        let lon_idx = find(&self.lon_column)?;
        let yield_idx = match &self.yield_column {
            Some(name) => find(name)?,
            None => detect_yield_column(headers.iter())?,
        };
        log::debug!(
            "Yield column: '{}'",
            headers.get(yield_idx).unwrap_or_default()
        );

        let mut observations = Vec::new();
        let mut dropped = 0usize;
        for record in reader.records() {
            let record = record?;
            let field = |idx: usize| {
                record
                    .get(idx)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .and_then(|s| s.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
            };
            match (field(lat_idx), field(lon_idx), field(yield_idx)) {
                (Some(lat), Some(lon), Some(observed_yield)) => observations.push(FieldObservation {
                    lat,
                    lon,
                    observed_yield,
                }),
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            log::warn!("Dropped {} incomplete field records", dropped);
        }
        log::info!("Loaded {} field observations", observations.len());
        Ok(observations)
    }
}

/// First header mentioning "yield", case-insensitive
fn detect_yield_column<'a, I>(headers: I) -> YieldResult<usize>
where
    I: Iterator<Item = &'a str>,
{
    let pattern = Regex::new(r"(?i)yield").map_err(|e| YieldError::Processing(e.to_string()))?;
    let mut headers = headers.enumerate();
    headers
        .find(|(_, h)| pattern.is_match(h))
        .map(|(i, _)| i)
        .ok_or_else(|| YieldError::InvalidFormat("No yield column found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURVEY: &str = "\
Farmer,Latitude,Longitude,Estimated /Observed Yield 2023
A,25.61,85.12,4.2
B,25.70,,3.9
C,25.80,85.30,n/a
D, 25.90 , 85.40 , 5.1
";

    #[test]
    fn test_detects_yield_column_and_drops_incomplete_rows() {
        let observations = FieldDataReader::new().read(SURVEY.as_bytes()).unwrap();
        assert_eq!(
            observations,
            vec![
                FieldObservation { lat: 25.61, lon: 85.12, observed_yield: 4.2 },
                FieldObservation { lat: 25.90, lon: 85.40, observed_yield: 5.1 },
            ]
        );
    }

    #[test]
    fn test_explicit_yield_column() {
        let csv = "Latitude,Longitude,yield_2022,Yield 2023\n20.0,80.0,2.0,3.0\n";
        let observations = FieldDataReader::new()
            .with_yield_column("Yield 2023")
            .read(csv.as_bytes())
            .unwrap();
        assert_eq!(observations[0].observed_yield, 3.0);

        let detected = FieldDataReader::new().read(csv.as_bytes()).unwrap();
        assert_eq!(detected[0].observed_yield, 2.0);
    }

    #[test]
    fn test_missing_columns() {
        let csv = "Latitude,Longitude\n20.0,80.0\n";
        assert!(FieldDataReader::new().read(csv.as_bytes()).is_err());

        let csv = "lat,lon,yield\n20.0,80.0,1.0\n";
        assert!(FieldDataReader::new().read(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_observations_table() {
        let table = observations_table(&[FieldObservation {
            lat: 1.0,
            lon: 2.0,
            observed_yield: 3.0,
        }]);
        assert_eq!(table.columns(), &[COLUMN_LAT, COLUMN_LON, COLUMN_YIELD]);
        assert_eq!(table.get(0, COLUMN_YIELD), Some(3.0));
    }
}
