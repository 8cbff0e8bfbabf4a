//! ArcGIS feature service layers.

use gis_protocol::arcgis;
use parcel_common::{Feature, LayerSpec};
use projection::{covering_bbox, reproject_geometry};
use tracing::debug;

use super::FetchContext;
use crate::error::{SourceError, SourceResult};

/// Features intersecting the request extent, reprojected into the working CRS.
pub(super) async fn fetch(spec: &LayerSpec, ctx: &FetchContext) -> SourceResult<Vec<Feature>> {
    let native = spec.native_crs;
    let query_extent = covering_bbox(&ctx.extent, ctx.working_crs, native)?;
    let params = ctx.with_token(arcgis::envelope_query_params(
        &query_extent,
        native,
        native,
        spec.out_fields.as_deref(),
        spec.where_clause.as_deref(),
    ));

    let body = ctx.client.get(&arcgis::query_url(&spec.source_url), &params).await?;
    let features = arcgis::parse_feature_collection(&body)?;
    if features.is_empty() {
        return Err(SourceError::Empty("no features intersect the map extent".to_string()));
    }
    debug!(layer = %spec.name, count = features.len(), "Parsed features");

    features
        .into_iter()
        .map(|f| -> SourceResult<Feature> {
            Ok(Feature {
                geometry: reproject_geometry(&f.geometry, native, ctx.working_crs)?,
                properties: f.properties,
            })
        })
        .collect()
}
