//! Error types for the parcel render pipeline.

use thiserror::Error;

use crate::crs::CrsParseError;

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Whole-request error taxonomy.
///
/// Per-layer fetch and render failures are not represented here: they are
/// recorded as warning strings on the result and never abort a request.
#[derive(Debug, Error)]
pub enum PipelineError {
    // === Request / configuration errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Layer not configured: {0}")]
    LayerNotConfigured(String),

    // === Resolution errors ===
    #[error("Parcel not found: {0}")]
    ParcelNotFound(String),

    #[error("Ambiguous parcel: {0}")]
    AmbiguousParcel(String),

    // === Geometry errors ===
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    // === Infrastructure errors ===
    #[error("Request timed out after {0} seconds")]
    RequestTimeout(u64),

    #[error("Rendering failed: {0}")]
    RenderError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PipelineError {
    /// HTTP status code the service layer should answer with.
    pub fn http_status_code(&self) -> u16 {
        match self {
            PipelineError::InvalidRequest(_)
            | PipelineError::Config(_)
            | PipelineError::LayerNotConfigured(_) => 400,

            PipelineError::ParcelNotFound(_) => 404,
            PipelineError::AmbiguousParcel(_) => 409,

            PipelineError::InvalidGeometry(_) | PipelineError::UnsupportedCrs(_) => 422,

            PipelineError::RequestTimeout(_) => 504,

            _ => 500,
        }
    }

    /// Short machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "InvalidRequest",
            PipelineError::Config(_) => "ConfigurationError",
            PipelineError::LayerNotConfigured(_) => "LayerNotConfigured",
            PipelineError::ParcelNotFound(_) => "ParcelNotFound",
            PipelineError::AmbiguousParcel(_) => "AmbiguousParcel",
            PipelineError::InvalidGeometry(_) => "InvalidGeometry",
            PipelineError::UnsupportedCrs(_) => "UnsupportedCRS",
            PipelineError::RequestTimeout(_) => "RequestTimeout",
            PipelineError::RenderError(_) => "RenderError",
            PipelineError::CacheError(_) => "CacheError",
            PipelineError::InternalError(_) => "InternalError",
        }
    }
}

impl From<CrsParseError> for PipelineError {
    fn from(err: CrsParseError) -> Self {
        match err {
            CrsParseError::UnsupportedCrs(code) => PipelineError::UnsupportedCrs(code),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::InternalError(format!("JSON error: {}", err))
    }
}
