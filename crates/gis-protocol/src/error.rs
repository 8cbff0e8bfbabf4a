//! Errors raised while interpreting upstream GIS responses.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// ArcGIS REST `{"error": {...}}` body, usually returned with HTTP 200
    #[error("ArcGIS error {code}: {message}")]
    ArcGis { code: i64, message: String },

    /// OGC ServiceException report
    #[error("service exception: {0}")]
    ServiceException(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("response is not an image ({0})")]
    NotAnImage(String),

    #[error("extent needs {tiles} tiles at minimum zoom {zoom}, limit is {max}")]
    TooManyTiles { tiles: usize, zoom: u32, max: usize },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
