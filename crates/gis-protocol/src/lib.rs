//! Request builders and response parsers for the GIS services a parcel
//! overlay draws from.
//!
//! Supports:
//! - ArcGIS REST feature layer queries and MapServer/ImageServer exports
//! - OGC WMS 1.1.1 and 1.3.0 GetMap
//! - XYZ tile templates
//! - LightBox and ArcGIS geocoders
//!
//! Nothing here performs I/O; callers send the parameters through their
//! own HTTP client and hand the bytes back for parsing.

pub mod arcgis;
pub mod error;
pub mod geocode;
pub mod wms;
pub mod xyz;

pub use arcgis::{parse_feature_collection, Params};
pub use error::{ProtocolError, ProtocolResult};
pub use wms::{expect_image, GetMapRequest, ImageKind, WmsVersion};
pub use xyz::{is_tile_template, plan_window, TileWindow};
