//! XYZ (slippy map) tile windows over Web Mercator extents.

use parcel_common::tile::{zoom_for_resolution, TILE_SIZE, WEB_MERCATOR_EXTENT};
use parcel_common::{BoundingBox, TileCoord};

use crate::error::{ProtocolError, ProtocolResult};

/// True when a URL is a `{z}/{x}/{y}` tile template.
pub fn is_tile_template(url: &str) -> bool {
    url.contains("{z}") && url.contains("{x}") && url.contains("{y}")
}

/// A rectangular block of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileWindow {
    pub zoom: u32,
    /// Column of the left-most tile
    pub min_x: u32,
    /// Row of the top-most tile
    pub min_y: u32,
    pub cols: u32,
    pub rows: u32,
}

impl TileWindow {
    pub fn tile_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Tiles in row-major order from the top-left.
    pub fn tiles(&self) -> Vec<TileCoord> {
        let mut tiles = Vec::with_capacity(self.tile_count());
        for y in self.min_y..self.min_y + self.rows {
            for x in self.min_x..self.min_x + self.cols {
                tiles.push(TileCoord::new(self.zoom, x, y));
            }
        }
        tiles
    }

    /// Mosaic size in pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.cols * TILE_SIZE, self.rows * TILE_SIZE)
    }

    /// Pixel offset of a tile's top-left corner inside the mosaic.
    pub fn pixel_offset(&self, tile: &TileCoord) -> (u32, u32) {
        (
            (tile.x - self.min_x) * TILE_SIZE,
            (tile.y - self.min_y) * TILE_SIZE,
        )
    }

    /// Mosaic bounds in Web Mercator metres.
    pub fn mercator_bounds(&self) -> BoundingBox {
        let top_left = TileCoord::new(self.zoom, self.min_x, self.min_y).mercator_bounds();
        let bottom_right = TileCoord::new(
            self.zoom,
            self.min_x + self.cols - 1,
            self.min_y + self.rows - 1,
        )
        .mercator_bounds();
        top_left.union(&bottom_right)
    }
}

fn tile_index(offset: f64, span: f64, n: u32) -> u32 {
    let max = n.saturating_sub(1) as f64;
    (offset / span).floor().clamp(0.0, max) as u32
}

/// Tiles covering a Web Mercator extent at a fixed zoom.
pub fn window_at_zoom(extent: &BoundingBox, zoom: u32) -> TileWindow {
    let n = 1u32 << zoom.min(30);
    let span = 2.0 * WEB_MERCATOR_EXTENT / n as f64;

    let x0 = tile_index(extent.min_x + WEB_MERCATOR_EXTENT, span, n);
    let x1 = tile_index(extent.max_x + WEB_MERCATOR_EXTENT, span, n);
    let y0 = tile_index(WEB_MERCATOR_EXTENT - extent.max_y, span, n);
    let y1 = tile_index(WEB_MERCATOR_EXTENT - extent.min_y, span, n);

    TileWindow {
        zoom,
        min_x: x0,
        min_y: y0,
        cols: x1 - x0 + 1,
        rows: y1 - y0 + 1,
    }
}

/// Pick the zoom whose resolution best matches drawing `extent` (Web
/// Mercator metres) onto a `width_px` canvas, then step down until the
/// window has at most `max_tiles` tiles. Fails when even `min_zoom` needs
/// more tiles than that.
pub fn plan_window(
    extent: &BoundingBox,
    width_px: u32,
    min_zoom: u32,
    max_zoom: u32,
    max_tiles: usize,
) -> ProtocolResult<TileWindow> {
    let max_tiles = max_tiles.max(1);
    let metres_per_pixel = extent.width() / width_px.max(1) as f64;
    let mut zoom = zoom_for_resolution(metres_per_pixel, min_zoom, max_zoom);
    let mut window = window_at_zoom(extent, zoom);
    while window.tile_count() > max_tiles && zoom > min_zoom {
        zoom -= 1;
        window = window_at_zoom(extent, zoom);
    }
    if window.tile_count() > max_tiles {
        return Err(ProtocolError::TooManyTiles {
            tiles: window.tile_count(),
            zoom,
            max: max_tiles,
        });
    }
    Ok(window)
}
