// Single-slot session state shared across the wasm exports. Nothing here
// survives a page reload.
use std::cell::RefCell;
use std::collections::HashMap;

use lazy_static::lazy_static;
use parking_lot::ReentrantMutex;

use crate::models::{Feature, FeatureCollection};
use crate::wfs::WfsEndpoint;

pub struct SessionState {
    /// Reprojected hazard layers by id.
    pub hazard_layers: HashMap<String, FeatureCollection>,
    /// Layer ids in load order.
    pub layer_order: Vec<String>,
    /// At most one selected zone, deep-copied out of its layer.
    pub selected_zone: Option<Feature>,
    /// Buildings fetched for the last count, replaced wholesale per query.
    pub buildings: Option<FeatureCollection>,
    pub endpoint: WfsEndpoint,
    fetch_in_progress: bool,
}

lazy_static! {
    static ref SESSION_STATE: ReentrantMutex<RefCell<SessionState>> =
        ReentrantMutex::new(RefCell::new(SessionState::new()));
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            hazard_layers: HashMap::new(),
            layer_order: Vec::new(),
            selected_zone: None,
            buildings: None,
            endpoint: WfsEndpoint::default(),
            fetch_in_progress: false,
        }
    }

    pub fn with<F, R>(f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        let guard = SESSION_STATE.lock();
        let borrow = guard.borrow();
        f(&borrow)
    }

    pub fn with_mut<F, R>(f: F) -> R
    where
        F: FnOnce(&mut SessionState) -> R,
    {
        let guard = SESSION_STATE.lock();
        let mut borrow = guard.borrow_mut();
        f(&mut borrow)
    }

    pub fn store_layer(&mut self, layer_id: &str, collection: FeatureCollection) {
        if !self.hazard_layers.contains_key(layer_id) {
            self.layer_order.push(layer_id.to_string());
        }
        self.hazard_layers.insert(layer_id.to_string(), collection);
    }

    /// Replaces the selected zone with a deep copy of the addressed feature,
    /// so later changes to the layer never alias the selection.
    pub fn select_zone(&mut self, layer_id: &str, feature_index: usize) -> Option<Feature> {
        let feature = self
            .hazard_layers
            .get(layer_id)?
            .features
            .get(feature_index)?
            .clone();
        self.selected_zone = Some(feature.clone());
        Some(feature)
    }

    pub fn clear_selected_zone(&mut self) {
        self.selected_zone = None;
    }

    /// Marks a count operation as running. Returns false when one is already
    /// in flight; the caller must refuse to start another.
    pub fn begin_fetch(&mut self) -> bool {
        if self.fetch_in_progress {
            return false;
        }
        self.fetch_in_progress = true;
        true
    }

    pub fn end_fetch(&mut self) {
        self.fetch_in_progress = false;
    }

    pub fn fetch_in_progress(&self) -> bool {
        self.fetch_in_progress
    }

    pub fn store_buildings(&mut self, buildings: FeatureCollection) {
        self.buildings = Some(buildings);
    }

    pub fn clear(&mut self) {
        *self = SessionState::new();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Geometry;
    use serde_json::{json, Value};

    fn zone_layer() -> FeatureCollection {
        FeatureCollection {
            r#type: "FeatureCollection".to_string(),
            features: vec![Feature {
                r#type: "Feature".to_string(),
                geometry: Some(Geometry {
                    r#type: "Polygon".to_string(),
                    coordinates: json!([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]),
                }),
                properties: json!({"navn": "sone 1"}),
            }],
        }
    }

    #[test]
    fn begin_fetch_is_single_flight() {
        let mut state = SessionState::new();
        assert!(state.begin_fetch());
        assert!(!state.begin_fetch());
        state.end_fetch();
        assert!(state.begin_fetch());
    }

    #[test]
    fn selection_is_a_deep_copy() {
        let mut state = SessionState::new();
        state.store_layer("flood", zone_layer());
        assert!(state.select_zone("flood", 0).is_some());

        // mutate the stored layer; the selection must not change with it
        state
            .hazard_layers
            .get_mut("flood")
            .unwrap()
            .features[0]
            .properties = Value::Null;

        let selected = state.selected_zone.as_ref().unwrap();
        assert_eq!(selected.properties, json!({"navn": "sone 1"}));
    }

    #[test]
    fn selection_is_replaced_wholesale() {
        let mut state = SessionState::new();
        state.store_layer("flood", zone_layer());
        let mut other = zone_layer();
        other.features[0].properties = json!({"navn": "sone 2"});
        state.store_layer("flood-200", other);

        state.select_zone("flood", 0);
        state.select_zone("flood-200", 0);
        let selected = state.selected_zone.as_ref().unwrap();
        assert_eq!(selected.properties, json!({"navn": "sone 2"}));
    }

    #[test]
    fn selecting_a_missing_feature_fails() {
        let mut state = SessionState::new();
        state.store_layer("flood", zone_layer());
        assert!(state.select_zone("flood", 7).is_none());
        assert!(state.select_zone("nope", 0).is_none());
    }

    #[test]
    fn layer_order_tracks_first_insertion() {
        let mut state = SessionState::new();
        state.store_layer("b", zone_layer());
        state.store_layer("a", zone_layer());
        state.store_layer("b", zone_layer()); // overwrite keeps position
        assert_eq!(state.layer_order, vec!["b", "a"]);
    }
}
