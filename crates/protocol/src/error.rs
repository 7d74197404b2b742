#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("{field} must be a finite non-negative number, got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("entity {entity_id} reported non-numeric state {state:?}")]
    NonNumeric { entity_id: String, state: String },

    #[error("entity {0} is unavailable")]
    Unavailable(String),

    #[error("device does not support energy monitoring: {0}")]
    Unsupported(String),

    #[error("device returned error {code}: {message}")]
    Device { code: i64, message: String },
}
