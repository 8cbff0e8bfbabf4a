//! GeoJSON-shaped geometry types.
//!
//! Geometries carry no CRS of their own; the owner (a `Parcel`, a feature
//! payload) records which CRS the coordinates are in.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::BoundingBox;

/// A single coordinate pair. Extra ordinates (z, m) are dropped on parse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.x)?;
        tup.serialize_element(&self.y)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PositionVisitor;

        impl<'de> Visitor<'de> for PositionVisitor {
            type Value = Position;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a coordinate array with at least two numbers")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Position, A::Error> {
                let x: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let y: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                while seq.next_element::<de::IgnoredAny>()?.is_some() {}
                Ok(Position { x, y })
            }
        }

        deserializer.deserialize_seq(PositionVisitor)
    }
}

/// GeoJSON geometry (GeometryCollection is not supported).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Axis-aligned polygon from a bounding box.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Geometry::Polygon(vec![vec![
            Position::new(bbox.min_x, bbox.min_y),
            Position::new(bbox.max_x, bbox.min_y),
            Position::new(bbox.max_x, bbox.max_y),
            Position::new(bbox.min_x, bbox.max_y),
            Position::new(bbox.min_x, bbox.min_y),
        ]])
    }

    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    pub fn is_polygonal(&self) -> bool {
        matches!(self, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
    }

    /// True when the geometry has no coordinates at all.
    pub fn is_empty(&self) -> bool {
        self.positions().next().is_none()
    }

    /// Iterate every coordinate, ring closures included.
    pub fn positions(&self) -> Box<dyn Iterator<Item = &Position> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(p)),
            Geometry::MultiPoint(pts) | Geometry::LineString(pts) => Box::new(pts.iter()),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                Box::new(lines.iter().flatten())
            }
            Geometry::MultiPolygon(polys) => Box::new(polys.iter().flatten().flatten()),
        }
    }

    /// Bounding box of all coordinates, `None` when empty.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.positions().map(|p| (p.x, p.y)))
    }

    /// Rings of every polygon part (outer ring first per part).
    pub fn polygons(&self) -> Vec<&Vec<Vec<Position>>> {
        match self {
            Geometry::Polygon(rings) => vec![rings],
            Geometry::MultiPolygon(polys) => polys.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Apply a coordinate transform to every position.
    pub fn try_map<E, F>(&self, f: &mut F) -> Result<Geometry, E>
    where
        F: FnMut(Position) -> Result<Position, E>,
    {
        fn ring<E, F: FnMut(Position) -> Result<Position, E>>(
            pts: &[Position],
            f: &mut F,
        ) -> Result<Vec<Position>, E> {
            pts.iter().map(|p| f(*p)).collect()
        }

        Ok(match self {
            Geometry::Point(p) => Geometry::Point(f(*p)?),
            Geometry::MultiPoint(pts) => Geometry::MultiPoint(ring(pts, f)?),
            Geometry::LineString(pts) => Geometry::LineString(ring(pts, f)?),
            Geometry::MultiLineString(lines) => Geometry::MultiLineString(
                lines.iter().map(|l| ring(l, f)).collect::<Result<_, _>>()?,
            ),
            Geometry::Polygon(rings) => Geometry::Polygon(
                rings.iter().map(|r| ring(r, f)).collect::<Result<_, _>>()?,
            ),
            Geometry::MultiPolygon(polys) => Geometry::MultiPolygon(
                polys
                    .iter()
                    .map(|rings| rings.iter().map(|r| ring(r, f)).collect::<Result<_, _>>())
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Area-weighted centroid of the outer rings, falling back to the bbox centre.
    pub fn centroid(&self) -> Option<Position> {
        let mut area_sum = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for rings in self.polygons() {
            if let Some(outer) = rings.first() {
                let (a, x, y) = ring_centroid(outer);
                area_sum += a;
                cx += x * a;
                cy += y * a;
            }
        }
        if area_sum.abs() > f64::EPSILON {
            return Some(Position::new(cx / area_sum, cy / area_sum));
        }
        self.bbox().map(|b| {
            let (x, y) = b.center();
            Position::new(x, y)
        })
    }
}

/// Signed area and centroid of a ring (shoelace formula).
fn ring_centroid(ring: &[Position]) -> (f64, f64, f64) {
    let mut area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for w in ring.windows(2) {
        let cross = w[0].x * w[1].y - w[1].x * w[0].y;
        area += cross;
        cx += (w[0].x + w[1].x) * cross;
        cy += (w[0].y + w[1].y) * cross;
    }
    area /= 2.0;
    if area.abs() < f64::EPSILON {
        return (0.0, 0.0, 0.0);
    }
    (area.abs(), cx / (6.0 * area), cy / (6.0 * area))
}

/// A geometry with its attribute table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Feature {
    /// String value of an attribute, numbers rendered as text.
    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Geometry {
        Geometry::Polygon(vec![vec![
            Position::new(0.0, 0.0),
            Position::new(2.0, 0.0),
            Position::new(2.0, 2.0),
            Position::new(0.0, 2.0),
            Position::new(0.0, 0.0),
        ]])
    }

    #[test]
    fn test_parse_geojson_polygon_with_z() {
        let json = r#"{"type":"Polygon","coordinates":[[[-80.0,35.0,12.5],[-79.9,35.0,0],[-79.9,35.1,0],[-80.0,35.0,0]]]}"#;
        let geom: Geometry = serde_json::from_str(json).unwrap();
        assert!(geom.is_polygonal());
        let bbox = geom.bbox().unwrap();
        assert_eq!(bbox.min_x, -80.0);
        assert_eq!(bbox.max_y, 35.1);
    }

    #[test]
    fn test_serialize_round_trips_shape() {
        let json = serde_json::to_value(square()).unwrap();
        assert_eq!(json["type"], "Polygon");
        assert_eq!(json["coordinates"][0][1][0], 2.0);
    }

    #[test]
    fn test_empty_geometry() {
        assert!(Geometry::Polygon(vec![]).is_empty());
        assert!(Geometry::MultiPolygon(vec![vec![vec![]]]).is_empty());
        assert!(Geometry::Polygon(vec![]).bbox().is_none());
        assert!(!square().is_empty());
    }

    #[test]
    fn test_centroid_of_square() {
        let c = square().centroid().unwrap();
        assert!((c.x - 1.0).abs() < 1e-12);
        assert!((c.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_try_map_shifts_every_position() {
        let shifted = square()
            .try_map::<(), _>(&mut |p| Ok(Position::new(p.x + 10.0, p.y)))
            .unwrap();
        assert_eq!(shifted.bbox().unwrap().min_x, 10.0);
    }

    #[test]
    fn test_feature_property_str() {
        let feature: Feature = serde_json::from_str(
            r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{"APN":12345,"ZONE":"R-1"}}"#,
        )
        .unwrap();
        assert_eq!(feature.property_str("APN").as_deref(), Some("12345"));
        assert_eq!(feature.property_str("ZONE").as_deref(), Some("R-1"));
        assert!(feature.property_str("MISSING").is_none());
    }
}
