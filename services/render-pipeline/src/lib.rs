//! Parcel overlay rendering pipeline.
//!
//! Turns an address or APN plus a list of layer names into one PNG per layer
//! and a PDF contact sheet:
//! - [`resolver`]: address/APN to parcel geometry through an ordered source chain
//! - [`adapters`]: per-layer fetch and normalization into the working CRS
//! - [`orchestrator`]: validation, timeouts, bounded fan-out, rendering

pub mod adapters;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod resolver;

pub use adapters::{fetch_basemap, FetchContext, LayerAdapter};
pub use config::{ParcelSourceConfig, ParcelsConfig, Settings, SourceConfig};
pub use error::{SourceError, SourceResult};
pub use orchestrator::{RenderOrchestrator, RequestState, ValidatedRequest};
pub use resolver::ParcelResolver;
