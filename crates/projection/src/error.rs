//! Projection errors.

use parcel_common::{CrsCode, PipelineError};
use thiserror::Error;

pub type ProjectionResult<T> = Result<T, ProjectionError>;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("{0}")]
    InvalidGeometry(String),

    #[error("{0}")]
    UnsupportedCrs(String),

    #[error("coordinate ({x}, {y}) cannot be transformed in {crs}")]
    OutOfDomain { crs: CrsCode, x: f64, y: f64 },
}

impl From<ProjectionError> for PipelineError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::InvalidGeometry(msg) => PipelineError::InvalidGeometry(msg),
            ProjectionError::UnsupportedCrs(msg) => PipelineError::UnsupportedCrs(msg),
            other @ ProjectionError::OutOfDomain { .. } => {
                PipelineError::InvalidGeometry(other.to_string())
            }
        }
    }
}
