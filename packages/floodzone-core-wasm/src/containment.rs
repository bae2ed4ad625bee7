// Point-in-polygon counting for the selected flood zone(s).
use geo::Contains;
use geo_types::{LineString, MultiPolygon, Point, Polygon};

use crate::models::{Feature, FeatureCollection};

fn ring_to_linestring(ring: &[Vec<f64>]) -> Option<LineString<f64>> {
    let coords: Vec<(f64, f64)> = ring
        .iter()
        .filter(|position| position.len() >= 2)
        .map(|position| (position[0], position[1]))
        .collect();
    if coords.len() < 3 {
        return None;
    }
    Some(LineString::from(coords))
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let mut rings = rings.iter();
    let exterior = ring_to_linestring(rings.next()?)?;
    let interiors = rings.filter_map(|ring| ring_to_linestring(ring)).collect();
    Some(Polygon::new(exterior, interiors))
}

/// Polygon parts of a zone feature. Non-areal geometries contribute nothing.
fn zone_polygons(zone: &Feature) -> Vec<Polygon<f64>> {
    let Some(geometry) = &zone.geometry else {
        return Vec::new();
    };
    match geometry.r#type.as_str() {
        "Polygon" => serde_json::from_value::<Vec<Vec<Vec<f64>>>>(geometry.coordinates.clone())
            .ok()
            .and_then(|rings| polygon_from_rings(&rings))
            .into_iter()
            .collect(),
        "MultiPolygon" => {
            serde_json::from_value::<Vec<Vec<Vec<Vec<f64>>>>>(geometry.coordinates.clone())
                .ok()
                .map(|polygons| {
                    polygons
                        .iter()
                        .filter_map(|rings| polygon_from_rings(rings))
                        .collect()
                })
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn point_of(feature: &Feature) -> Option<Point<f64>> {
    let geometry = feature.geometry.as_ref()?;
    if geometry.r#type != "Point" {
        return None;
    }
    let coords = geometry.coordinates.as_array()?;
    Some(Point::new(coords.first()?.as_f64()?, coords.get(1)?.as_f64()?))
}

/// Counts distinct points that fall inside at least one zone. A point inside
/// two overlapping zones counts once (containment is "inside the set", not
/// "inside N zones"). Empty zone set returns 0 immediately.
///
/// O(points x zones); the selected-zone set is one feature in practice.
pub fn count_points_in_zones(points: &FeatureCollection, zones: &[Feature]) -> usize {
    if zones.is_empty() {
        return 0;
    }
    let zone_parts: Vec<MultiPolygon<f64>> = zones
        .iter()
        .map(|zone| MultiPolygon::new(zone_polygons(zone)))
        .collect();
    if zone_parts.iter().all(|parts| parts.0.is_empty()) {
        return 0;
    }

    points
        .features
        .iter()
        .filter(|feature| {
            let Some(point) = point_of(feature) else {
                return false;
            };
            zone_parts.iter().any(|parts| parts.contains(&point))
        })
        .count()
}
