// Shared data structures for the flood-zone pipeline.
use serde::{Deserialize, Serialize};

fn feature_type() -> String {
    "Feature".to_string()
}

fn collection_type() -> String {
    "FeatureCollection".to_string()
}

// Geometry part of a feature. Coordinates stay a dynamic value so a single
// recursive walker covers all six GeoJSON geometry types.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Geometry {
    pub r#type: String,
    #[serde(default)]
    pub coordinates: serde_json::Value,
}

// GeoJSON-like feature structure
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Feature {
    #[serde(default = "feature_type")]
    pub r#type: String,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FeatureCollection {
    #[serde(default = "collection_type")]
    pub r#type: String,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        FeatureCollection {
            r#type: collection_type(),
            features: Vec::new(),
        }
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// Axis-aligned lon/lat box. Starts out empty and grows as leaf coordinates
/// are absorbed; west <= east and south <= north once populated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LngLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LngLatBounds {
    pub fn empty() -> Self {
        LngLatBounds {
            west: f64::INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            north: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.west > self.east || self.south > self.north
    }

    pub fn extend(&mut self, lng: f64, lat: f64) {
        self.west = self.west.min(lng);
        self.south = self.south.min(lat);
        self.east = self.east.max(lng);
        self.north = self.north.max(lat);
    }

    /// `[west, south, east, north]`, or None while the box is still empty.
    pub fn to_array(&self) -> Option<[f64; 4]> {
        if self.is_empty() {
            None
        } else {
            Some([self.west, self.south, self.east, self.north])
        }
    }
}

// ========================
// JS boundary input/output models
// ========================

/// One static hazard file to load, addressed by relative path.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HazardFileInput {
    pub path: String,
    pub layer_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HazardLayersInput {
    pub files: Vec<HazardFileInput>,
    /// The first layer whose id contains this pattern supplies the initial
    /// view-fit bounds (list order, first match wins).
    #[serde(default)]
    pub fit_layer_pattern: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct HazardLayerOutput {
    pub layer_id: String,
    pub geometry_types: Vec<String>,
    pub layer_ids: Vec<String>,
    pub feature_count: usize,
    pub collection: FeatureCollection,
}

#[derive(Serialize, Debug)]
pub struct HazardLayersResult {
    pub layers: Vec<HazardLayerOutput>,
    pub fit_bounds: Option<[f64; 4]>,
    pub status: String,
}

#[derive(Serialize, Debug)]
pub struct ZoneSelection {
    pub layer_id: String,
    pub feature_index: usize,
    pub bounds: Option<[f64; 4]>,
    pub status: String,
}

#[derive(Serialize, Debug)]
pub struct CountResult {
    /// Buildings inside the selected zone.
    pub count: usize,
    /// Buildings fetched from the feature service for the zone's bbox.
    pub fetched: usize,
    /// Total the service reported for the bbox in the hits phase.
    pub total_matched: u64,
    pub status: String,
}

#[derive(Serialize, Debug)]
pub struct SessionStats {
    pub layers_loaded: usize,
    pub zone_selected: bool,
    pub buildings_loaded: usize,
    pub fetch_in_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bounds_report_empty() {
        let bounds = LngLatBounds::empty();
        assert!(bounds.is_empty());
        assert_eq!(bounds.to_array(), None);
    }

    #[test]
    fn single_point_yields_degenerate_box() {
        let mut bounds = LngLatBounds::empty();
        bounds.extend(10.0, 60.0);
        assert!(!bounds.is_empty());
        assert_eq!(bounds.to_array(), Some([10.0, 60.0, 10.0, 60.0]));
    }

    #[test]
    fn extend_keeps_invariant() {
        let mut bounds = LngLatBounds::empty();
        bounds.extend(8.2, 58.1);
        bounds.extend(7.9, 58.3);
        assert!(bounds.west <= bounds.east);
        assert!(bounds.south <= bounds.north);
        assert_eq!(bounds.to_array(), Some([7.9, 58.1, 8.2, 58.3]));
    }

    #[test]
    fn feature_defaults_fill_in() {
        let feature: Feature = serde_json::from_str(r#"{"geometry": null}"#).unwrap();
        assert_eq!(feature.r#type, "Feature");
        assert!(feature.geometry.is_none());
        assert!(feature.properties.is_null());
    }
}
