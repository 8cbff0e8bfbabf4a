//! Renderer errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid canvas: {0}")]
    InvalidCanvas(String),

    #[error("corrupt raster: {0}")]
    CorruptRaster(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type DrawResult<T> = Result<T, RenderError>;
