//! Buffered map extents around a parcel.

use parcel_common::{BoundingBox, CrsCode, Geometry, FOOT_METRES};

use crate::transform::{covering_bbox, point_scale, unproject_point};
use crate::{ProjectionError, ProjectionResult};

/// Smallest ground distance added on every side, so the extent strictly
/// contains the parcel even with a zero buffer.
pub const MIN_PAD_METRES: f64 = 0.001;

/// Bounding box of `geometry` grown by `buffer_feet` of ground distance on
/// every side, in `working_crs` (the CRS the geometry is expressed in).
///
/// Projected CRSs are buffered in their own unit, corrected by the point
/// scale at the centroid. Geographic CRSs are buffered in the UTM zone of
/// the centroid and the result is reprojected back.
pub fn buffered_extent(
    geometry: &Geometry,
    buffer_feet: f64,
    working_crs: CrsCode,
) -> ProjectionResult<BoundingBox> {
    if geometry.is_empty() {
        return Err(ProjectionError::InvalidGeometry(
            "parcel geometry is empty".to_string(),
        ));
    }
    if !geometry.is_polygonal() {
        return Err(ProjectionError::InvalidGeometry(format!(
            "parcel geometry must be a Polygon or MultiPolygon, got {}",
            geometry.type_name()
        )));
    }
    if !(buffer_feet.is_finite() && buffer_feet >= 0.0) {
        return Err(ProjectionError::InvalidGeometry(format!(
            "buffer must be a non-negative distance, got {} ft",
            buffer_feet
        )));
    }

    let bbox = geometry
        .bbox()
        .filter(BoundingBox::is_valid)
        .ok_or_else(|| ProjectionError::InvalidGeometry("parcel geometry has no valid extent".to_string()))?;
    let centroid = geometry.centroid().map(|p| (p.x, p.y)).unwrap_or_else(|| bbox.center());
    let buffer_m = (buffer_feet * FOOT_METRES).max(MIN_PAD_METRES);

    let extent = match working_crs.linear_unit().metres() {
        Some(unit_m) => {
            let (lon, lat) = unproject_point(working_crs, centroid.0, centroid.1)?;
            let d = buffer_m / unit_m * point_scale(working_crs, lon, lat);
            bbox.expand(d, d)
        }
        None => {
            let utm = CrsCode::utm_for(centroid.0, centroid.1);
            let local = covering_bbox(&bbox, working_crs, utm)?;
            let d = buffer_m * point_scale(utm, centroid.0, centroid.1);
            covering_bbox(&local.expand(d, d), utm, working_crs)?
        }
    };

    Ok(ensure_strict(extent, &bbox))
}

/// Widen `extent` if floating point drift left it touching `inner`.
fn ensure_strict(extent: BoundingBox, inner: &BoundingBox) -> BoundingBox {
    if extent.strictly_contains(inner) {
        return extent;
    }
    let eps = (inner.width().max(inner.height()) * 1e-9).max(1e-9);
    extent.union(&inner.expand(eps, eps))
}

/// Grow `extent` on one axis so its aspect ratio matches the canvas, keeping
/// the centre. Pixels come out square in the extent's CRS units.
pub fn fit_extent_to_canvas(extent: &BoundingBox, width_px: u32, height_px: u32) -> BoundingBox {
    if width_px == 0 || height_px == 0 {
        return *extent;
    }
    extent.fit_aspect(width_px as f64 / height_px as f64)
}
