//! Raster layers: XYZ tile templates and ArcGIS export endpoints.

use futures::stream::{self, StreamExt};
use gis_protocol::arcgis;
use gis_protocol::wms::expect_image;
use gis_protocol::xyz::{is_tile_template, plan_window};
use parcel_common::tile::TILE_SIZE;
use parcel_common::{CrsCode, LayerSpec, RasterOverlay, TileCoord};
use projection::covering_bbox;
use renderer::{blit, decode_image, fit_to_square, warp_to_canvas, GeoRaster};
use tracing::{debug, warn};

use super::{native_image_size, FetchContext, MAX_TILES, TILE_CONCURRENCY};
use crate::error::{SourceError, SourceResult};

pub(super) async fn fetch(spec: &LayerSpec, ctx: &FetchContext) -> SourceResult<RasterOverlay> {
    if is_tile_template(&spec.source_url) {
        fetch_tiles(spec, ctx).await
    } else {
        fetch_export(spec, ctx).await
    }
}

/// Mosaic of Web Mercator tiles covering the extent.
async fn fetch_tiles(spec: &LayerSpec, ctx: &FetchContext) -> SourceResult<RasterOverlay> {
    let extent_3857 = covering_bbox(&ctx.extent, ctx.working_crs, CrsCode::WebMercator)?;
    let window = plan_window(
        &extent_3857,
        ctx.canvas.width_px,
        spec.min_zoom,
        spec.max_zoom,
        MAX_TILES,
    )?;
    let tiles = window.tiles();
    debug!(
        layer = %spec.name,
        zoom = window.zoom,
        cols = window.cols,
        rows = window.rows,
        "Tile window"
    );

    let fetched: Vec<(TileCoord, SourceResult<RasterOverlay>)> = stream::iter(tiles)
        .map(|tile| async move {
            let url = tile.fill_template(&spec.source_url, &spec.subdomains);
            (tile, fetch_tile(ctx, &url).await)
        })
        .buffer_unordered(TILE_CONCURRENCY)
        .collect()
        .await;

    let (width, height) = window.pixel_size();
    let mut mosaic = RasterOverlay::transparent(width, height);
    let mut failures = 0usize;
    let mut last_error = None;
    for (tile, result) in fetched {
        match result {
            Ok(image) => {
                let (x, y) = window.pixel_offset(&tile);
                blit(&mut mosaic, &image, x, y);
            }
            Err(e) => {
                warn!(layer = %spec.name, z = tile.z, x = tile.x, y = tile.y, error = %e, "Tile failed");
                failures += 1;
                last_error = Some(e);
            }
        }
    }
    if failures == window.tile_count() {
        return Err(match last_error {
            Some(e) => SourceError::Empty(format!("all {} tiles failed, last error: {}", failures, e)),
            None => SourceError::Empty("tile window is empty".to_string()),
        });
    }

    let source = GeoRaster {
        image: &mosaic,
        bbox: window.mercator_bounds(),
        crs: CrsCode::WebMercator,
    };
    Ok(warp_to_canvas(
        &source,
        &ctx.extent,
        ctx.working_crs,
        ctx.canvas.width_px,
        ctx.canvas.height_px,
    )?)
}

async fn fetch_tile(ctx: &FetchContext, url: &str) -> SourceResult<RasterOverlay> {
    let no_params: &[(&str, &str)] = &[];
    let body = ctx.client.get(url, no_params).await?;
    expect_image(&body)?;
    // `@2x` templates serve 512 px tiles; the mosaic is laid out in 256 px cells
    Ok(fit_to_square(decode_image(&body)?, TILE_SIZE))
}

/// MapServer `export` / ImageServer `exportImage` for the extent.
async fn fetch_export(spec: &LayerSpec, ctx: &FetchContext) -> SourceResult<RasterOverlay> {
    let native = spec.native_crs;
    let native_extent = covering_bbox(&ctx.extent, ctx.working_crs, native)?;
    let (width, height) = native_image_size(&native_extent, &ctx.canvas);

    let params = ctx.with_token(arcgis::export_params(
        &native_extent,
        native,
        width,
        height,
        ctx.canvas.dpi,
        spec.layers.as_deref(),
    ));
    let body = ctx.client.get(&arcgis::export_url(&spec.source_url), &params).await?;
    if body.first() == Some(&b'{') {
        // ArcGIS reports export errors as JSON with HTTP 200
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(gis_protocol::ProtocolError::from)?;
        arcgis::check_error(&value)?;
    }
    expect_image(&body)?;

    let image = decode_image(&body)?;
    let source = GeoRaster {
        image: &image,
        bbox: native_extent,
        crs: native,
    };
    Ok(warp_to_canvas(
        &source,
        &ctx.extent,
        ctx.working_crs,
        ctx.canvas.width_px,
        ctx.canvas.height_px,
    )?)
}
