//! Decoding, mosaicking and opacity for RGBA rasters.

use parcel_common::RasterOverlay;

use crate::error::{DrawResult, RenderError};

/// Decode a PNG/JPEG/GIF/TIFF body into a straight-alpha RGBA raster.
pub fn decode_image(bytes: &[u8]) -> DrawResult<RasterOverlay> {
    let decoded = image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(RenderError::Decode("image has no pixels".to_string()));
    }
    Ok(RasterOverlay {
        width,
        height,
        data: rgba.into_raw(),
    })
}

/// Copy `tile` into `target` with its top-left corner at `(x, y)`, clipping
/// at the edges.
pub fn blit(target: &mut RasterOverlay, tile: &RasterOverlay, x: u32, y: u32) {
    if x >= target.width || y >= target.height || !tile.is_well_formed() {
        return;
    }
    let cols = tile.width.min(target.width - x) as usize;
    let rows = tile.height.min(target.height - y) as usize;
    let target_stride = target.width as usize * 4;
    let tile_stride = tile.width as usize * 4;

    for row in 0..rows {
        let dst = (y as usize + row) * target_stride + x as usize * 4;
        let src = row * tile_stride;
        target.data[dst..dst + cols * 4].copy_from_slice(&tile.data[src..src + cols * 4]);
    }
}

/// Resample `raster` to `size` x `size` unless it already is.
pub fn fit_to_square(raster: RasterOverlay, size: u32) -> RasterOverlay {
    if raster.width == size && raster.height == size {
        return raster;
    }
    let (width, height) = (raster.width, raster.height);
    let image = match image::RgbaImage::from_raw(width, height, raster.data) {
        Some(image) => image,
        None => return RasterOverlay::transparent(size, size),
    };
    let resized = image::imageops::resize(&image, size, size, image::imageops::FilterType::Triangle);
    RasterOverlay {
        width: size,
        height: size,
        data: resized.into_raw(),
    }
}

/// Scale every alpha value by `opacity` (0..=1).
pub fn apply_opacity(raster: &mut RasterOverlay, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity >= 1.0 {
        return;
    }
    for px in raster.data.chunks_exact_mut(4) {
        px[3] = (px[3] as f32 * opacity).round() as u8;
    }
}

/// Check a payload before it is drawn.
pub fn validate_raster(raster: &RasterOverlay) -> DrawResult<()> {
    if raster.is_well_formed() {
        Ok(())
    } else {
        Err(RenderError::CorruptRaster(format!(
            "{}x{} raster carries {} bytes",
            raster.width,
            raster.height,
            raster.data.len()
        )))
    }
}
