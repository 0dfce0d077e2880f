//! Administrative boundaries (state / district / block)

use crate::engine::from_geojson;
use crate::types::{Region, YieldError, YieldResult};
use geojson::{GeoJson, JsonValue};
use std::collections::BTreeSet;
use std::path::Path;

pub const ATTR_STATE: &str = "State";
pub const ATTR_DISTRICT: &str = "District";
pub const ATTR_BLOCK: &str = "Block";

/// All block polygons of a boundary file, in file order
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
}

impl RegionSet {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> YieldResult<Self> {
        let path = path.as_ref();
        log::info!("Reading regions: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&text)
    }

    /// Parse a FeatureCollection whose features all carry string
    /// `State`, `District` and `Block` properties
    pub fn from_geojson_str(text: &str) -> YieldResult<Self> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e: geojson::Error| YieldError::InvalidFormat(format!("Invalid GeoJSON: {}", e)))?;
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => {
                return Err(YieldError::InvalidFormat(
                    "Regions file must be a FeatureCollection".to_string(),
                ))
            }
        };

        let mut regions = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.into_iter().enumerate() {
            let mut properties = feature.properties.unwrap_or_default();
            let mut take = |attribute: &str| match properties.remove(attribute) {
                Some(JsonValue::String(s)) => Ok(s),
                _ => Err(YieldError::MissingAttribute {
                    attribute: attribute.to_string(),
                    index,
                }),
            };
            let state = take(ATTR_STATE)?;
            let district = take(ATTR_DISTRICT)?;
            let block = take(ATTR_BLOCK)?;

            let geometry = feature.geometry.as_ref().ok_or_else(|| {
                YieldError::InvalidFormat(format!("Feature {} has no geometry", index))
            })?;
            regions.push(Region {
                state,
                district,
                block,
                geometry: from_geojson(geometry)?,
                properties,
            });
        }

        log::info!("Loaded {} regions", regions.len());
        Ok(Self { regions })
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sorted unique state names
    pub fn states(&self) -> Vec<String> {
        self.regions
            .iter()
            .map(|r| r.state.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted unique district names of `state`
    pub fn districts(&self, state: &str) -> Vec<String> {
        self.regions
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.district.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Blocks of one district, in file order
    pub fn select(&self, state: &str, district: &str) -> Vec<Region> {
        self.regions
            .iter()
            .filter(|r| r.state == state && r.district == district)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(state: &str, district: &str, block: &str, x0: f64) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"State":"{}","District":"{}","Block":"{}","code":7}},
               "geometry":{{"type":"Polygon","coordinates":[[[{x0},0],[{x1},0],[{x1},1],[{x0},1],[{x0},0]]]}}}}"#,
            state,
            district,
            block,
            x0 = x0,
            x1 = x0 + 1.0
        )
    }

    fn collection(features: &[String]) -> String {
        format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features.join(","))
    }

    fn sample() -> RegionSet {
        RegionSet::from_geojson_str(&collection(&[
            feature("Bihar", "Patna", "Maner", 0.0),
            feature("Bihar", "Gaya", "Bodh Gaya", 1.0),
            feature("Assam", "Kamrup", "Rani", 2.0),
            feature("Bihar", "Patna", "Danapur", 3.0),
        ]))
        .unwrap()
    }

    #[test]
    fn test_states_and_districts_are_sorted_unique() {
        let regions = sample();
        assert_eq!(regions.len(), 4);
        assert_eq!(regions.states(), vec!["Assam", "Bihar"]);
        assert_eq!(regions.districts("Bihar"), vec!["Gaya", "Patna"]);
        assert!(regions.districts("Kerala").is_empty());
    }

    #[test]
    fn test_select_keeps_file_order_and_extra_properties() {
        let selected = sample().select("Bihar", "Patna");
        let blocks: Vec<&str> = selected.iter().map(|r| r.block.as_str()).collect();
        assert_eq!(blocks, vec!["Maner", "Danapur"]);
        assert_eq!(selected[0].properties["code"], 7);
        assert!(!selected[0].properties.contains_key("State"));
    }

    #[test]
    fn test_missing_attribute() {
        let text = collection(&[
            feature("Bihar", "Patna", "Maner", 0.0),
            r#"{"type":"Feature","properties":{"State":"Bihar","District":null,"Block":"X"},
                "geometry":{"type":"Point","coordinates":[0,0]}}"#
                .to_string(),
        ]);
        match RegionSet::from_geojson_str(&text) {
            Err(YieldError::MissingAttribute { attribute, index }) => {
                assert_eq!(attribute, "District");
                assert_eq!(index, 1);
            }
            other => panic!("expected MissingAttribute, got {:?}", other),
        }
    }

    #[test]
    fn test_not_a_collection() {
        let text = r#"{"type":"Point","coordinates":[0,0]}"#;
        assert!(RegionSet::from_geojson_str(text).is_err());
        assert!(RegionSet::from_path("/nonexistent/regions.geojson").is_err());
    }
}
