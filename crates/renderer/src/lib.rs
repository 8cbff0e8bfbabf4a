//! Overlay rendering for parcel map images.
//!
//! - [`canvas`]: tiny-skia drawing of basemap, features, parcel highlight and frame
//! - [`warp`]: resampling native-CRS rasters onto the working-CRS canvas
//! - [`png`]: indexed/RGBA PNG encoding with DPI metadata
//! - [`pdf`]: the multi-page contact sheet
//! - [`compose`]: per-request output of every layer image

pub mod canvas;
pub mod compose;
pub mod error;
pub mod pdf;
pub mod png;
pub mod raster;
pub mod warp;

pub use canvas::MapCanvas;
pub use compose::{LayerInput, RenderJob, RenderOutput, Renderer, CONTACT_SHEET_FILE};
pub use error::{DrawResult, RenderError};
pub use png::encode_png;
pub use raster::{apply_opacity, blit, decode_image, fit_to_square};
pub use warp::{warp_to_canvas, GeoRaster};
