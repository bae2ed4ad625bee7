// Collection-level operations: in-place reprojection, geometry-type
// classification for the renderer, and bounding-box computation.
use std::collections::BTreeSet;

use serde_json::Value;

use crate::errors::PipelineError;
use crate::models::{Feature, FeatureCollection, LngLatBounds};
use crate::reproject::{is_leaf_position, Reprojector};

/// Reprojects every feature's geometry in place. Features without geometry
/// or with null coordinates are skipped silently; features whose
/// coordinates fail to transform are left untouched and counted as skipped.
/// Only a projection-setup failure is fatal.
pub fn reproject_collection(
    collection: &mut FeatureCollection,
    from_epsg: u16,
    to_epsg: u16,
) -> Result<usize, PipelineError> {
    let reprojector = Reprojector::new(from_epsg, to_epsg)?;

    let mut skipped = 0;
    for feature in &mut collection.features {
        let Some(geometry) = feature.geometry.as_mut() else {
            continue;
        };
        if geometry.coordinates.is_null() {
            continue;
        }
        match reprojector.reproject_coords(&geometry.coordinates) {
            Ok(coords) => geometry.coordinates = coords,
            Err(_) => skipped += 1,
        }
    }
    Ok(skipped)
}

/// Deduplicated set of base geometry types present in the collection
/// (MultiPolygon counts as Polygon, and so on). The renderer materializes
/// one layer per base type.
pub fn classify_geometry_types(collection: &FeatureCollection) -> BTreeSet<String> {
    let mut types = BTreeSet::new();
    for feature in &collection.features {
        if let Some(geometry) = &feature.geometry {
            let base = geometry
                .r#type
                .strip_prefix("Multi")
                .unwrap_or(&geometry.r#type);
            types.insert(base.to_string());
        }
    }
    types
}

/// Renderer layer identifiers for a loaded hazard layer, one per base type.
pub fn layer_ids_for(layer_id: &str, types: &BTreeSet<String>) -> Vec<String> {
    types
        .iter()
        .map(|base| format!("{}-{}", layer_id, base.to_lowercase()))
        .collect()
}

fn extend_bounds(bounds: &mut LngLatBounds, value: &Value) {
    let Some(items) = value.as_array() else {
        return;
    };
    if is_leaf_position(items) {
        // Only the first two components matter for the box
        if let (Some(lng), Some(lat)) = (items[0].as_f64(), items[1].as_f64()) {
            bounds.extend(lng, lat);
        }
    } else {
        for item in items {
            extend_bounds(bounds, item);
        }
    }
}

pub fn feature_bounds(feature: &Feature) -> LngLatBounds {
    let mut bounds = LngLatBounds::empty();
    if let Some(geometry) = &feature.geometry {
        extend_bounds(&mut bounds, &geometry.coordinates);
    }
    bounds
}

pub fn collection_bounds(collection: &FeatureCollection) -> LngLatBounds {
    let mut bounds = LngLatBounds::empty();
    for feature in &collection.features {
        if let Some(geometry) = &feature.geometry {
            extend_bounds(&mut bounds, &geometry.coordinates);
        }
    }
    bounds
}
