use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

// ─── Unified error type ──────────────────────────────────────────

/// Everything the profiler can fail with.
///
/// Too little history is not an error; the stability checks answer `false`.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// A caller handed a derivation an argument outside its domain.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The load driver could not change level or capture a window.
    #[error("load driver: {0}")]
    Driver(String),

    /// Status was requested before the first window completed.
    #[error("no measurement window has completed yet")]
    NoMeasurements,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

impl IntoResponse for ProfileError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidArgument(_) | Self::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Self::NoMeasurements => StatusCode::NOT_FOUND,
            Self::Driver(_) | Self::Io(_) | Self::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error":  self.to_string(),
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
