//! Integration tests for bounding boxes and geometry envelopes.

use parcel_common::bbox::{BboxParseError, BoundingBox};
use parcel_common::{Geometry, Position};

#[test]
fn test_parse_bbox_scientific_and_negative() {
    let bbox = BoundingBox::from_wms_string("-2.0e7,-1.5e7,2.0e7,1.5e7").unwrap();
    assert_eq!(bbox.min_x, -2.0e7);
    assert_eq!(bbox.max_y, 1.5e7);
}

#[test]
fn test_parse_bbox_tolerates_whitespace() {
    let bbox = BoundingBox::from_wms_string(" 1, 2 ,3,4 ").unwrap();
    assert_eq!(bbox, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
}

#[test]
fn test_parse_bbox_errors() {
    assert!(matches!(
        BoundingBox::from_wms_string("1,2,3"),
        Err(BboxParseError::InvalidFormat(_))
    ));
    assert!(matches!(
        BoundingBox::from_wms_string("1,2,x,4"),
        Err(BboxParseError::InvalidNumber(_))
    ));
    assert!(BoundingBox::from_wms_string("").is_err());
}

#[test]
fn test_axis_order_strings() {
    let bbox = BoundingBox::new(-80.0, 35.0, -79.0, 36.0);
    assert_eq!(bbox.to_xy_string(), "-80,35,-79,36");
    assert_eq!(bbox.to_yx_string(), "35,-80,36,-79");
}

#[test]
fn test_adjacent_boxes_do_not_intersect() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
    assert!(!a.intersects(&b));
    assert!(a.intersection(&b).is_none());
}

#[test]
fn test_union_and_expand() {
    let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
    let b = BoundingBox::new(2.0, -1.0, 3.0, 0.5);
    let u = a.union(&b);
    assert_eq!(u, BoundingBox::new(0.0, -1.0, 3.0, 1.0));

    let e = a.expand(0.5, 2.0);
    assert_eq!(e, BoundingBox::new(-0.5, -2.0, 1.5, 3.0));
    assert!(e.strictly_contains(&a));
}

#[test]
fn test_invalid_boxes() {
    assert!(!BoundingBox::new(1.0, 0.0, 0.0, 1.0).is_valid());
    assert!(!BoundingBox::new(0.0, 0.0, f64::NAN, 1.0).is_valid());
    assert!(BoundingBox::new(0.0, 0.0, 0.0, 0.0).is_valid());
}

#[test]
fn test_fit_aspect_degenerate_box_is_unchanged() {
    let point = BoundingBox::new(5.0, 5.0, 5.0, 5.0);
    assert_eq!(point.fit_aspect(1.5), point);
}

#[test]
fn test_multipolygon_envelope() {
    let geom = Geometry::MultiPolygon(vec![
        vec![vec![
            Position::new(0.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(1.0, 1.0),
            Position::new(0.0, 0.0),
        ]],
        vec![vec![
            Position::new(5.0, 5.0),
            Position::new(6.0, 5.0),
            Position::new(6.0, 7.0),
            Position::new(5.0, 5.0),
        ]],
    ]);
    assert_eq!(geom.bbox().unwrap(), BoundingBox::new(0.0, 0.0, 6.0, 7.0));
}

#[test]
fn test_max_corner_delta() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(0.1, -0.3, 10.0, 10.2);
    assert!((a.max_corner_delta(&b) - 0.3).abs() < 1e-12);
}
