use thiserror::Error;
use wasm_bindgen::JsValue;

/// Failure taxonomy for the pipeline. Transport and protocol failures abort
/// the operation that raised them; per-feature defects (bad tokens, missing
/// geometry) are handled by skipping the feature and never reach this type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("network error: {0}")]
    Network(String),

    /// Service exception embedded in a WFS response. The message is the
    /// exception text verbatim.
    #[error("{0}")]
    Protocol(String),

    #[error("malformed XML response: {0}")]
    Xml(String),

    #[error("invalid GeoJSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("projection failed: {0}")]
    Projection(String),

    #[error("malformed coordinates: {0}")]
    MalformedCoordinates(String),

    #[error("aborted after {0} pages; the feature service keeps returning full pages")]
    PageLimitExceeded(u32),
}

impl From<PipelineError> for JsValue {
    fn from(err: PipelineError) -> JsValue {
        JsValue::from_str(&err.to_string())
    }
}
