//! XYZ (slippy map) tile math on the Web Mercator grid.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};

/// Half the side of the Web Mercator square in metres.
pub const WEB_MERCATOR_EXTENT: f64 = 20037508.342789244;

/// Latitude limit of the Web Mercator square.
pub const MAX_MERCATOR_LAT: f64 = 85.05112878;

/// Pixels per tile edge.
pub const TILE_SIZE: u32 = 256;

/// Used for `{s}` when a template configures no subdomains.
pub const DEFAULT_SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y), counted from the top
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Tile bounds in Web Mercator metres.
    pub fn mercator_bounds(&self) -> BoundingBox {
        let span = 2.0 * WEB_MERCATOR_EXTENT / 2f64.powi(self.z as i32);
        let min_x = -WEB_MERCATOR_EXTENT + self.x as f64 * span;
        let max_y = WEB_MERCATOR_EXTENT - self.y as f64 * span;
        BoundingBox::new(min_x, max_y - span, min_x + span, max_y)
    }

    /// Expand a URL template with `{z}`, `{x}`, `{y}` and an optional `{s}`
    /// subdomain picked deterministically from the tile position.
    pub fn fill_template(&self, template: &str, subdomains: &[String]) -> String {
        let mut url = template
            .replace("{z}", &self.z.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string());
        if url.contains("{s}") {
            let i = self.x as usize + self.y as usize;
            let sub = if subdomains.is_empty() {
                DEFAULT_SUBDOMAINS[i % DEFAULT_SUBDOMAINS.len()]
            } else {
                subdomains[i % subdomains.len()].as_str()
            };
            url = url.replace("{s}", sub);
        }
        url
    }
}

/// Metres per pixel at the equator for a zoom level.
pub fn resolution_at_zoom(zoom: u32) -> f64 {
    2.0 * WEB_MERCATOR_EXTENT / (TILE_SIZE as f64 * 2f64.powi(zoom as i32))
}

/// Lowest zoom whose resolution is at least as fine as `metres_per_pixel`,
/// clamped to `min_zoom..=max_zoom`.
pub fn zoom_for_resolution(metres_per_pixel: f64, min_zoom: u32, max_zoom: u32) -> u32 {
    let max_zoom = max_zoom.max(min_zoom);
    if !(metres_per_pixel.is_finite() && metres_per_pixel > 0.0) {
        return max_zoom;
    }
    let z = (resolution_at_zoom(0) / metres_per_pixel).log2().ceil();
    (z.max(0.0) as u32).clamp(min_zoom, max_zoom)
}
