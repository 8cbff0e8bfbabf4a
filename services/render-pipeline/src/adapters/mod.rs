//! Layer adapters: one fetch-and-normalize capability over three source kinds.
//!
//! Every adapter takes the shared request extent in the working CRS and
//! returns either features in the working CRS or a raster already aligned to
//! the request canvas. Failures never escape: they become
//! [`FetchResult::Failed`] with a warning naming the layer.

mod feature;
mod raster;
mod wms;

use http_cache::CachedClient;
use metrics::counter;
use parcel_common::{AdapterKind, BoundingBox, CanvasSpec, CrsCode, FetchResult, LayerPayload, LayerSpec, RasterOverlay};
use tracing::{info, instrument, warn};

use crate::error::{SourceError, SourceResult};

/// Cap on XYZ tiles fetched for one layer.
pub const MAX_TILES: usize = 64;

/// Simultaneous tile requests within one raster layer.
pub const TILE_CONCURRENCY: usize = 8;

/// Shared inputs of every layer fetch in one request.
#[derive(Clone)]
pub struct FetchContext {
    pub client: CachedClient,
    /// Fitted request extent in `working_crs`
    pub extent: BoundingBox,
    pub working_crs: CrsCode,
    pub canvas: CanvasSpec,
    /// Appended to ArcGIS requests as `token`
    pub arcgis_token: Option<String>,
}

impl FetchContext {
    fn with_token(&self, mut params: gis_protocol::Params) -> gis_protocol::Params {
        if let Some(token) = &self.arcgis_token {
            params.push(("token", token.clone()));
        }
        params
    }
}

/// The closed set of adapter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerAdapter {
    /// ArcGIS feature query, normalized to working-CRS features
    FeatureService,
    /// OGC WMS GetMap, warped to the canvas
    Wms,
    /// XYZ tile mosaic or ArcGIS export image, warped to the canvas
    Raster,
}

impl LayerAdapter {
    pub fn for_kind(kind: AdapterKind) -> Self {
        match kind {
            AdapterKind::FeatureService => LayerAdapter::FeatureService,
            AdapterKind::Wms => LayerAdapter::Wms,
            AdapterKind::RasterTile | AdapterKind::Contour | AdapterKind::Soils | AdapterKind::Flood => {
                LayerAdapter::Raster
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LayerAdapter::FeatureService => "feature_service",
            LayerAdapter::Wms => "wms",
            LayerAdapter::Raster => "raster",
        }
    }

    /// Fetch one layer. Never fails: errors become a warning result.
    #[instrument(skip(self, spec, ctx), fields(layer = %spec.name, adapter = self.name()))]
    pub async fn fetch(&self, spec: &LayerSpec, ctx: &FetchContext) -> FetchResult {
        match self.fetch_payload(spec, ctx).await {
            Ok(payload) => {
                counter!("layer_fetch_success_total").increment(1);
                info!(layer = %spec.name, "Layer fetched");
                FetchResult::Success {
                    layer: spec.name.clone(),
                    payload,
                }
            }
            Err(e) => {
                counter!("layer_fetch_failure_total").increment(1);
                warn!(layer = %spec.name, error = %e, "Layer fetch failed");
                FetchResult::failed(&spec.name, e)
            }
        }
    }

    async fn fetch_payload(&self, spec: &LayerSpec, ctx: &FetchContext) -> SourceResult<LayerPayload> {
        match self {
            LayerAdapter::FeatureService => feature::fetch(spec, ctx).await.map(LayerPayload::Features),
            LayerAdapter::Wms => wms::fetch(spec, ctx).await.map(LayerPayload::Raster),
            LayerAdapter::Raster => raster::fetch(spec, ctx).await.map(LayerPayload::Raster),
        }
    }
}

/// Fetch the configured basemap as a canvas-aligned raster.
#[instrument(skip(spec, ctx), fields(layer = %spec.name))]
pub async fn fetch_basemap(spec: &LayerSpec, ctx: &FetchContext) -> SourceResult<RasterOverlay> {
    match LayerAdapter::for_kind(spec.adapter_kind).fetch_payload(spec, ctx).await? {
        LayerPayload::Raster(raster) => Ok(raster),
        LayerPayload::Features(_) => Err(SourceError::NotConfigured(
            "basemap must be a raster source".to_string(),
        )),
    }
}

/// Pixel size of a native-CRS request covering `native_extent`, keeping the
/// canvas width and the extent's aspect ratio.
fn native_image_size(native_extent: &BoundingBox, canvas: &CanvasSpec) -> (u32, u32) {
    let width = canvas.width_px.clamp(1, 4096);
    let aspect = native_extent.height() / native_extent.width();
    let height = (width as f64 * aspect).round().clamp(1.0, 4096.0) as u32;
    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(LayerAdapter::for_kind(AdapterKind::FeatureService), LayerAdapter::FeatureService);
        assert_eq!(LayerAdapter::for_kind(AdapterKind::Wms), LayerAdapter::Wms);
        for kind in [AdapterKind::RasterTile, AdapterKind::Contour, AdapterKind::Soils, AdapterKind::Flood] {
            assert_eq!(LayerAdapter::for_kind(kind), LayerAdapter::Raster);
        }
    }

    #[test]
    fn test_native_image_size_keeps_aspect() {
        let canvas = CanvasSpec::new(800, 600, 150);
        assert_eq!(native_image_size(&BoundingBox::new(0.0, 0.0, 200.0, 100.0), &canvas), (800, 400));
        assert_eq!(native_image_size(&BoundingBox::new(0.0, 0.0, 1.0, 100.0), &canvas), (800, 4096));
    }
}
