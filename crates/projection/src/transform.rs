//! Point, bounding box and geometry reprojection between supported CRSs.
//!
//! Every transform goes through geographic longitude/latitude. WGS84 and NAD83
//! are treated as the same datum; they differ by about a metre, which is below
//! what parcel-scale overlays can show.

use parcel_common::{BoundingBox, CrsCode, Geometry, Position, UtmDatum};

use crate::lambert::{metres_to_us_feet, us_feet_to_metres};
use crate::{mercator, Ellipsoid, LambertConformal, ProjectionError, ProjectionResult, TransverseMercator};

/// Samples per bbox edge when reprojecting extents.
pub const EDGE_SAMPLES: usize = 21;

/// A ready-to-use forward/inverse projection for one CRS.
#[derive(Debug, Clone)]
pub enum Projection {
    Geographic,
    WebMercator,
    TransverseMercator(TransverseMercator),
    /// Lambert state plane; output in US survey feet
    StatePlane(LambertConformal),
}

impl Projection {
    pub fn for_crs(crs: CrsCode) -> Self {
        match crs {
            CrsCode::Wgs84 | CrsCode::Nad83 => Projection::Geographic,
            CrsCode::WebMercator => Projection::WebMercator,
            CrsCode::Utm { zone, north, datum } => {
                let ellipsoid = match datum {
                    UtmDatum::Wgs84 => Ellipsoid::WGS84,
                    UtmDatum::Nad83 => Ellipsoid::GRS80,
                };
                Projection::TransverseMercator(TransverseMercator::utm(zone, north, ellipsoid))
            }
            CrsCode::StatePlane(zone) => Projection::StatePlane(LambertConformal::state_plane(zone)),
        }
    }

    /// Longitude/latitude to CRS units.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (lon, lat),
            Projection::WebMercator => mercator::forward(lon, lat),
            Projection::TransverseMercator(tm) => tm.forward(lon, lat),
            Projection::StatePlane(lcc) => {
                let (x, y) = lcc.forward(lon, lat);
                (metres_to_us_feet(x), metres_to_us_feet(y))
            }
        }
    }

    /// CRS units to longitude/latitude.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (x, y),
            Projection::WebMercator => mercator::inverse(x, y),
            Projection::TransverseMercator(tm) => tm.inverse(x, y),
            Projection::StatePlane(lcc) => lcc.inverse(us_feet_to_metres(x), us_feet_to_metres(y)),
        }
    }

    /// Ratio of projected distance to ground distance at a point. 1.0 for
    /// geographic CRSs, where the notion does not apply.
    pub fn scale_factor(&self, lon: f64, lat: f64) -> f64 {
        match self {
            Projection::Geographic => 1.0,
            Projection::WebMercator => mercator::scale_factor(lat),
            Projection::TransverseMercator(tm) => tm.scale_factor(lon, lat),
            Projection::StatePlane(lcc) => lcc.scale_factor(lat),
        }
    }
}

fn checked(crs: CrsCode, x: f64, y: f64) -> ProjectionResult<(f64, f64)> {
    if x.is_finite() && y.is_finite() {
        Ok((x, y))
    } else {
        Err(ProjectionError::OutOfDomain { crs, x, y })
    }
}

/// Project longitude/latitude (degrees) into `crs`.
pub fn project_point(crs: CrsCode, lon: f64, lat: f64) -> ProjectionResult<(f64, f64)> {
    if !(-90.0..=90.0).contains(&lat) || !lon.is_finite() {
        return Err(ProjectionError::OutOfDomain { crs, x: lon, y: lat });
    }
    let (x, y) = Projection::for_crs(crs).forward(lon, lat);
    checked(crs, x, y)
}

/// Unproject a `crs` coordinate into longitude/latitude (degrees).
pub fn unproject_point(crs: CrsCode, x: f64, y: f64) -> ProjectionResult<(f64, f64)> {
    checked(crs, x, y)?;
    let (lon, lat) = Projection::for_crs(crs).inverse(x, y);
    checked(crs, lon, lat)
}

/// Point scale factor of `crs` at a longitude/latitude.
pub fn point_scale(crs: CrsCode, lon: f64, lat: f64) -> f64 {
    Projection::for_crs(crs).scale_factor(lon, lat)
}

fn same_frame(from: CrsCode, to: CrsCode) -> bool {
    from == to || (from.is_geographic() && to.is_geographic())
}

/// A prepared transform between two CRSs, for converting many points.
#[derive(Debug, Clone)]
pub struct Transformer {
    from: CrsCode,
    to: CrsCode,
    src: Projection,
    dst: Projection,
    identity: bool,
}

impl Transformer {
    pub fn new(from: CrsCode, to: CrsCode) -> Self {
        Self {
            from,
            to,
            src: Projection::for_crs(from),
            dst: Projection::for_crs(to),
            identity: same_frame(from, to),
        }
    }

    pub fn transform(&self, x: f64, y: f64) -> ProjectionResult<(f64, f64)> {
        if self.identity {
            return checked(self.from, x, y);
        }
        let (lon, lat) = self.src.inverse(x, y);
        checked(self.from, lon, lat)?;
        let (tx, ty) = self.dst.forward(lon, lat);
        checked(self.to, tx, ty)
    }
}

/// Transform a single coordinate between CRSs.
pub fn reproject_point(from: CrsCode, to: CrsCode, x: f64, y: f64) -> ProjectionResult<(f64, f64)> {
    Transformer::new(from, to).transform(x, y)
}

/// Reproject an extent by its lower-left and upper-right corners.
///
/// The result round-trips exactly (up to floating point) but can miss the
/// corners of the source area when the target grid is rotated against the
/// source. Use [`covering_bbox`] when the result must enclose the whole area.
pub fn reproject_bbox(bbox: &BoundingBox, from: CrsCode, to: CrsCode) -> ProjectionResult<BoundingBox> {
    validate_bbox(bbox)?;
    if same_frame(from, to) {
        return Ok(*bbox);
    }
    let (x0, y0) = reproject_point(from, to, bbox.min_x, bbox.min_y)?;
    let (x1, y1) = reproject_point(from, to, bbox.max_x, bbox.max_y)?;
    Ok(BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)))
}

/// Envelope of a bounding box after reprojection. Each edge is densified so
/// curved and rotated edges in the target CRS are enclosed.
pub fn covering_bbox(bbox: &BoundingBox, from: CrsCode, to: CrsCode) -> ProjectionResult<BoundingBox> {
    validate_bbox(bbox)?;
    if same_frame(from, to) {
        return Ok(*bbox);
    }

    let transformer = Transformer::new(from, to);
    let steps = (EDGE_SAMPLES - 1) as f64;

    let mut out: Option<BoundingBox> = None;
    for i in 0..EDGE_SAMPLES {
        let fx = bbox.min_x + bbox.width() * i as f64 / steps;
        let fy = bbox.min_y + bbox.height() * i as f64 / steps;
        for (x, y) in [
            (fx, bbox.min_y),
            (fx, bbox.max_y),
            (bbox.min_x, fy),
            (bbox.max_x, fy),
        ] {
            let (tx, ty) = transformer.transform(x, y)?;
            match out.as_mut() {
                Some(b) => b.include_point(tx, ty),
                None => out = Some(BoundingBox::new(tx, ty, tx, ty)),
            }
        }
    }

    out.ok_or_else(|| ProjectionError::InvalidGeometry("empty bounding box".to_string()))
}

fn validate_bbox(bbox: &BoundingBox) -> ProjectionResult<()> {
    if bbox.is_valid() {
        Ok(())
    } else {
        Err(ProjectionError::InvalidGeometry(format!(
            "invalid bounding box {}",
            bbox.to_xy_string()
        )))
    }
}

/// Transform every vertex of a geometry.
pub fn reproject_geometry(geometry: &Geometry, from: CrsCode, to: CrsCode) -> ProjectionResult<Geometry> {
    if same_frame(from, to) {
        return Ok(geometry.clone());
    }
    let transformer = Transformer::new(from, to);
    geometry.try_map(&mut |p: Position| {
        transformer
            .transform(p.x, p.y)
            .map(|(x, y)| Position::new(x, y))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_common::StatePlaneZone;

    #[test]
    fn test_identity_between_geographic_datums() {
        let (x, y) = reproject_point(CrsCode::Wgs84, CrsCode::Nad83, -78.5, 35.5).unwrap();
        assert_eq!((x, y), (-78.5, 35.5));
    }

    #[test]
    fn test_state_plane_output_is_feet() {
        let nc = CrsCode::StatePlane(StatePlaneZone::NorthCarolina);
        let (x, _) = project_point(nc, -79.0, 33.75).unwrap();
        assert!((x - 2_000_000.0).abs() < 0.01, "x {}", x);
    }

    #[test]
    fn test_project_rejects_bad_latitude() {
        assert!(project_point(CrsCode::WebMercator, 0.0, 91.0).is_err());
        assert!(unproject_point(CrsCode::WebMercator, f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_reproject_bbox_keeps_axis_order() {
        let bbox = BoundingBox::new(-78.65, 35.77, -78.63, 35.79);
        let merc = reproject_bbox(&bbox, CrsCode::Wgs84, CrsCode::WebMercator).unwrap();
        // x is easting (negative, west), y is northing
        assert!(merc.min_x < 0.0 && merc.min_y > 4_000_000.0);
        assert!(merc.width() > 0.0 && merc.height() > 0.0);
    }

    #[test]
    fn test_covering_bbox_encloses_rotated_grid() {
        let bbox = BoundingBox::new(-78.65, 35.77, -78.63, 35.79);
        let utm = CrsCode::utm_for(-78.64, 35.78);
        let corners = reproject_bbox(&bbox, CrsCode::Wgs84, utm).unwrap();
        let covering = covering_bbox(&bbox, CrsCode::Wgs84, utm).unwrap();
        assert!(covering.contains(&corners));
        assert!(covering.width() > corners.width());

        let (ulx, uly) = reproject_point(CrsCode::Wgs84, utm, bbox.min_x, bbox.max_y).unwrap();
        assert!(covering.contains_point(ulx, uly));
    }

    #[test]
    fn test_reproject_geometry_round_trip() {
        let utm = CrsCode::utm_for(-78.64, 35.78);
        let geom = Geometry::from_bbox(&BoundingBox::new(-78.65, 35.77, -78.63, 35.79));
        let there = reproject_geometry(&geom, CrsCode::Wgs84, utm).unwrap();
        let back = reproject_geometry(&there, utm, CrsCode::Wgs84).unwrap();
        let delta = geom.bbox().unwrap().max_corner_delta(&back.bbox().unwrap());
        assert!(delta < 1e-7, "delta {}", delta);
    }
}
