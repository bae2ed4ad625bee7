// Coordinate reprojection between the hazard-file CRS and WGS84 using pure
// Rust (proj4rs + crs-definitions), so it runs unchanged inside wasm.
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde_json::Value;

use crate::errors::PipelineError;

/// Projected CRS the static hazard files are delivered in (ETRS89 / UTM 32N).
pub const HAZARD_FILE_EPSG: u16 = 25832;
/// Geographic CRS everything is rendered and queried in.
pub const WGS84_EPSG: u16 = 4326;

fn proj_string(epsg: u16) -> Result<&'static str, PipelineError> {
    crs_definitions::from_code(epsg)
        .map(|def| def.proj4)
        .ok_or_else(|| {
            PipelineError::Projection(format!(
                "EPSG:{} is not in the crs-definitions database",
                epsg
            ))
        })
}

fn is_geographic(epsg: u16) -> bool {
    proj_string(epsg)
        .map(|s| s.contains("+proj=longlat"))
        .unwrap_or(epsg == WGS84_EPSG)
}

/// Projection pair prepared once and applied to every leaf coordinate.
pub struct Reprojector {
    from: Proj,
    to: Proj,
    from_is_geographic: bool,
    to_is_geographic: bool,
    same_crs: bool,
}

impl Reprojector {
    pub fn new(from_epsg: u16, to_epsg: u16) -> Result<Self, PipelineError> {
        let from = Proj::from_proj_string(proj_string(from_epsg)?).map_err(|e| {
            PipelineError::Projection(format!(
                "invalid source projection EPSG:{}: {:?}",
                from_epsg, e
            ))
        })?;
        let to = Proj::from_proj_string(proj_string(to_epsg)?).map_err(|e| {
            PipelineError::Projection(format!(
                "invalid target projection EPSG:{}: {:?}",
                to_epsg, e
            ))
        })?;

        Ok(Reprojector {
            from,
            to,
            from_is_geographic: is_geographic(from_epsg),
            to_is_geographic: is_geographic(to_epsg),
            same_crs: from_epsg == to_epsg,
        })
    }

    /// Transform a single x/y pair.
    pub fn transform_xy(&self, x: f64, y: f64) -> Result<(f64, f64), PipelineError> {
        if self.same_crs {
            return Ok((x, y));
        }

        // proj4rs works in radians for geographic CRSs
        let (x_in, y_in) = if self.from_is_geographic {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };

        let mut point = (x_in, y_in, 0.0);
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| PipelineError::Projection(format!("transform failed: {:?}", e)))?;

        if self.to_is_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }

    /// Reproject an arbitrarily nested coordinate value. A leaf is an array
    /// of length >= 2 whose first element is numeric; leaves get their first
    /// two components transformed and any trailing components (elevation)
    /// passed through untouched. Everything else recurses element-wise,
    /// preserving length and order. The input is never mutated.
    pub fn reproject_coords(&self, value: &Value) -> Result<Value, PipelineError> {
        let items = value.as_array().ok_or_else(|| {
            PipelineError::MalformedCoordinates("coordinates must be an array".to_string())
        })?;

        if is_leaf_position(items) {
            let x = items[0].as_f64().ok_or_else(non_numeric)?;
            let y = items[1].as_f64().ok_or_else(non_numeric)?;
            let (tx, ty) = self.transform_xy(x, y)?;

            let mut out = Vec::with_capacity(items.len());
            out.push(number(tx)?);
            out.push(number(ty)?);
            out.extend(items[2..].iter().cloned());
            Ok(Value::Array(out))
        } else {
            let out = items
                .iter()
                .map(|item| self.reproject_coords(item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(out))
        }
    }
}

/// Recursion rule shared with the bounds walker: a coordinate leaf is a
/// sequence of length >= 2 starting with a number.
pub fn is_leaf_position(items: &[Value]) -> bool {
    items.len() >= 2 && items[0].is_number()
}

fn non_numeric() -> PipelineError {
    PipelineError::MalformedCoordinates("non-numeric coordinate component".to_string())
}

fn number(v: f64) -> Result<Value, PipelineError> {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| {
            PipelineError::MalformedCoordinates("transform produced a non-finite value".to_string())
        })
}
