//! OGC WMS layers.

use gis_protocol::wms::{expect_image, GetMapRequest, WmsVersion};
use parcel_common::{LayerSpec, RasterOverlay};
use projection::covering_bbox;
use renderer::{decode_image, warp_to_canvas, GeoRaster};
use tracing::debug;

use super::{native_image_size, FetchContext};
use crate::error::SourceResult;

/// GetMap for the extent in the layer's CRS, warped onto the canvas.
pub(super) async fn fetch(spec: &LayerSpec, ctx: &FetchContext) -> SourceResult<RasterOverlay> {
    let native = spec.native_crs;
    let native_extent = covering_bbox(&ctx.extent, ctx.working_crs, native)?;
    let (width, height) = native_image_size(&native_extent, &ctx.canvas);

    let request = GetMapRequest {
        layers: spec.layers.clone().unwrap_or_default(),
        styles: spec.styles.clone().unwrap_or_default(),
        version: WmsVersion::parse(spec.version.as_deref()),
        crs: native,
        bbox: native_extent,
        width,
        height,
    };
    let body = ctx.client.get(&spec.source_url, &request.to_params()).await?;
    let kind = expect_image(&body)?;
    debug!(layer = %spec.name, ?kind, bytes = body.len(), "GetMap image");

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
