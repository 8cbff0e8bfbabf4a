//! Failures of a single upstream source.
//!
//! These never abort a request on their own: the resolver moves on to the
//! next lookup source and adapters turn them into layer warnings.

use gis_protocol::ProtocolError;
use http_cache::FetchError;
use projection::ProjectionError;
use renderer::RenderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("reprojection failed: {0}")]
    Projection(#[from] ProjectionError),

    #[error("{0}")]
    Raster(#[from] RenderError),

    #[error("{0}")]
    Empty(String),

    #[error("{0}")]
    NotConfigured(String),
}

pub type SourceResult<T> = Result<T, SourceError>;
