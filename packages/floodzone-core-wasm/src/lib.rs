use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use serde_wasm_bindgen::{from_value, to_value};

// Create a console module for logging
pub mod console;
// Point-in-polygon counting
mod containment;
// Pipeline error taxonomy
mod errors;
// GML/WFS response parsing
mod gml;
// Shared data structures
mod models;
// Collection-level reprojection, classification and bounds
mod normalize;
// CRS transforms
mod reproject;
// Per-session shared state
mod session;
// Paged GetFeature client
mod wfs;

use errors::PipelineError;
use models::{
    CountResult, FeatureCollection, HazardLayerOutput, HazardLayersInput, HazardLayersResult,
    SessionStats, ZoneSelection,
};
use session::SessionState;

// Enable better panic messages in console during development
#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

#[wasm_bindgen]
extern "C" {
    // JavaScript helper that resolves to the response body as text and
    // rejects on network failure or a non-success status
    #[wasm_bindgen(js_namespace = wasmJsHelpers, catch)]
    pub fn fetch_text(url: &str) -> Result<js_sys::Promise, JsValue>;
}

// Use the macro from our console module
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => (crate::console::log(&format!($($t)*)))
}

use std::sync::Once;
static INIT: Once = Once::new();

// This sets up the wasm_bindgen start functionality
#[wasm_bindgen(start)]
pub fn start() {
    INIT.call_once(|| {
        // Set the panic hook for better error messages
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        console_log!("floodzone core initialized");
    });
}

fn js_error_text(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

async fn http_get_text(url: &str) -> Result<String, PipelineError> {
    let promise = fetch_text(url).map_err(|e| PipelineError::Network(js_error_text(&e)))?;
    let response = JsFuture::from(promise)
        .await
        .map_err(|e| PipelineError::Network(js_error_text(&e)))?;
    response
        .as_string()
        .ok_or_else(|| PipelineError::Network(format!("response from {} was not text", url)))
}

/// Loads the static hazard GeoJSON files, reprojects them from the hazard
/// CRS to WGS84 and stores them in the session. A file that fails to fetch
/// or parse is skipped and the remaining files are still processed; the
/// status string names the skipped layers. The first layer whose id matches
/// `fit_layer_pattern` (list order) supplies the initial view-fit bounds.
#[wasm_bindgen]
pub async fn load_hazard_layers(input_js: JsValue) -> Result<JsValue, JsValue> {
    let input: HazardLayersInput =
        from_value(input_js).map_err(|e| JsValue::from_str(&format!("invalid input: {}", e)))?;

    let mut layers = Vec::new();
    let mut fit_bounds: Option<[f64; 4]> = None;
    let mut skipped: Vec<String> = Vec::new();

    for file in &input.files {
        let text = match http_get_text(&file.path).await {
            Ok(text) => text,
            Err(err) => {
                console_log!("skipping {}: {}", file.path, err);
                skipped.push(file.layer_id.clone());
                continue;
            }
        };
        let mut collection: FeatureCollection = match serde_json::from_str(&text) {
            Ok(collection) => collection,
            Err(err) => {
                console_log!("skipping {}: {}", file.path, PipelineError::from(err));
                skipped.push(file.layer_id.clone());
                continue;
            }
        };

        // projection setup failure is fatal, malformed features are not
        let dropped = normalize::reproject_collection(
            &mut collection,
            reproject::HAZARD_FILE_EPSG,
            reproject::WGS84_EPSG,
        )
        .map_err(JsValue::from)?;
        if dropped > 0 {
            console_log!(
                "{}: {} features had malformed coordinates",
                file.layer_id,
                dropped
            );
        }

        let types = normalize::classify_geometry_types(&collection);
        let layer_ids = normalize::layer_ids_for(&file.layer_id, &types);

        if fit_bounds.is_none() {
            if let Some(pattern) = &input.fit_layer_pattern {
                if file.layer_id.contains(pattern.as_str()) {
                    fit_bounds = normalize::collection_bounds(&collection).to_array();
                }
            }
        }

        let feature_count = collection.features.len();
        SessionState::with_mut(|state| state.store_layer(&file.layer_id, collection.clone()));

        layers.push(HazardLayerOutput {
            layer_id: file.layer_id.clone(),
            geometry_types: types.into_iter().collect(),
            layer_ids,
            feature_count,
            collection,
        });
    }

    let status = if skipped.is_empty() {
        format!("Loaded {} hazard layers", layers.len())
    } else {
        format!(
            "Loaded {} hazard layers, skipped {}: {}",
            layers.len(),
            skipped.len(),
            skipped.join(", ")
        )
    };
    console_log!("{}", status);

    to_js(&HazardLayersResult {
        layers,
        fit_bounds,
        status,
    })
}

/// Deep-copies the addressed feature into the selected-zone slot, replacing
/// any previous selection.
#[wasm_bindgen]
pub fn select_zone(layer_id: &str, feature_index: usize) -> Result<JsValue, JsValue> {
    let zone = SessionState::with_mut(|state| state.select_zone(layer_id, feature_index));
    let Some(zone) = zone else {
        return Err(JsValue::from_str(&format!(
            "no feature {} in layer '{}'",
            feature_index, layer_id
        )));
    };

    let bounds = normalize::feature_bounds(&zone).to_array();
    to_js(&ZoneSelection {
        layer_id: layer_id.to_string(),
        feature_index,
        bounds,
        status: format!("Selected flood zone {} from '{}'", feature_index, layer_id),
    })
}

#[wasm_bindgen]
pub fn clear_selected_zone() {
    SessionState::with_mut(|state| state.clear_selected_zone());
}

/// Points the building fetch at a different WFS endpoint.
#[wasm_bindgen]
pub fn configure_wfs(base_url: &str, type_name: &str) {
    SessionState::with_mut(|state| {
        state.endpoint.base_url = base_url.to_string();
        state.endpoint.type_name = type_name.to_string();
    });
}

/// Counts the buildings inside the selected flood zone: a hits request to
/// bound the paging, then sequential pages, then the containment count. The
/// fetched buildings replace the previous set in the session. Only one
/// count may run at a time; a second call while one is in flight is
/// rejected.
#[wasm_bindgen]
pub async fn count_buildings_in_selected_zone() -> Result<JsValue, JsValue> {
    let zone = SessionState::with(|state| state.selected_zone.clone());
    let Some(zone) = zone else {
        return Err(JsValue::from_str("no flood zone selected"));
    };

    if !SessionState::with_mut(|state| state.begin_fetch()) {
        return Err(JsValue::from_str("a building count is already running"));
    }

    let endpoint = SessionState::with(|state| state.endpoint.clone());
    let result = run_building_count(&zone, &endpoint).await;
    SessionState::with_mut(|state| state.end_fetch());

    match result {
        Ok(count_result) => to_js(&count_result),
        Err(err) => {
            console_log!("building count failed: {}", err);
            Err(JsValue::from(err))
        }
    }
}

async fn run_building_count(
    zone: &models::Feature,
    endpoint: &wfs::WfsEndpoint,
) -> Result<CountResult, PipelineError> {
    let bounds = normalize::feature_bounds(zone);
    if bounds.is_empty() {
        return Err(PipelineError::MalformedCoordinates(
            "selected zone has no coordinates".to_string(),
        ));
    }

    // Phase 1: hit count, used as a hard bound on the paging below
    let hits_xml = http_get_text(&endpoint.hits_url(&bounds)).await?;
    let total_matched = gml::parse_hits_total(&hits_xml)?;
    console_log!("feature service reports {} buildings in bbox", total_matched);

    // Phase 2: page through the features
    let buildings = wfs::fetch_pages(
        |start_index| {
            let url = endpoint.page_url(&bounds, start_index, wfs::DEFAULT_PAGE_SIZE);
            async move { http_get_text(&url).await }
        },
        wfs::DEFAULT_PAGE_SIZE,
        Some(total_matched),
    )
    .await?;

    let fetched = buildings.features.len();
    let count = containment::count_points_in_zones(&buildings, std::slice::from_ref(zone));
    SessionState::with_mut(|state| state.store_buildings(buildings));

    Ok(CountResult {
        count,
        fetched,
        total_matched,
        status: format!(
            "{} of {} fetched buildings are inside the selected flood zone",
            count, fetched
        ),
    })
}

/// Snapshot of the session for debugging and UI state.
#[wasm_bindgen]
pub fn session_stats() -> Result<JsValue, JsValue> {
    let stats = SessionState::with(|state| SessionStats {
        layers_loaded: state.hazard_layers.len(),
        zone_selected: state.selected_zone.is_some(),
        buildings_loaded: state
            .buildings
            .as_ref()
            .map(|fc| fc.features.len())
            .unwrap_or(0),
        fetch_in_progress: state.fetch_in_progress(),
    });
    to_js(&stats)
}

/// Drops all session state: layers, selection, fetched buildings.
#[wasm_bindgen]
pub fn clear_session() {
    SessionState::with_mut(|state| state.clear());
}
