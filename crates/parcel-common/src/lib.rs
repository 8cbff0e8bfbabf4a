//! Common types and utilities shared across the parcel overlay workspace.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod layer;
pub mod model;
pub mod style;
pub mod tile;

pub use bbox::BoundingBox;
pub use crs::{CrsCode, LinearUnit, StatePlaneZone, UtmDatum, FOOT_METRES, US_SURVEY_FOOT_METRES};
pub use error::{PipelineError, PipelineResult};
pub use geometry::{Feature, Geometry, Position};
pub use layer::{AdapterKind, LayerSpec};
pub use model::{
    CanvasSpec, FetchResult, LayerPayload, Parcel, ParcelSummary, RasterOverlay, RenderRequest,
    RenderResponse, RenderResult,
};
pub use style::{Color, LayerStyle, ParcelHighlight};
pub use tile::TileCoord;
