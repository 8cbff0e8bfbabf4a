//! Sample parcels and source configurations.

use parcel_common::{BoundingBox, Geometry, Position};

/// Downtown Raleigh, NC.
pub mod place {
    pub const ADDRESS: &str = "222 W Hargett St, Raleigh, NC";
    pub const APN: &str = "1703-59-4212";
    pub const COUNTY: &str = "Wake";

    /// WGS84 bounds of [`super::raleigh_lot`]
    pub const LOT_BBOX: (f64, f64, f64, f64) = (-78.6390, 35.7790, -78.6386, 35.7796);
}

/// An L-shaped lot of about 40 m in WGS84.
pub fn raleigh_lot() -> Geometry {
    Geometry::Polygon(vec![vec![
        Position::new(-78.6390, 35.7790),
        Position::new(-78.6386, 35.7790),
        Position::new(-78.6386, 35.7793),
        Position::new(-78.6388, 35.7793),
        Position::new(-78.6388, 35.7796),
        Position::new(-78.6390, 35.7796),
        Position::new(-78.6390, 35.7790),
    ]])
}

/// A square lot `offset` degrees east of [`raleigh_lot`], for multi-match responses.
pub fn neighbouring_lot(offset: f64) -> Geometry {
    let (min_x, min_y, max_x, max_y) = place::LOT_BBOX;
    Geometry::from_bbox(&BoundingBox::new(min_x + offset, min_y, max_x + offset, max_y))
}

/// Source configuration YAML with every upstream pointing at `base_url`.
///
/// Layers:
/// - `zoning`: feature service at `/zoning/FeatureServer/0`
/// - `flood`: ArcGIS MapServer export at `/flood/MapServer`
/// - `wetlands`: WMS at `/wetlands/wms`
/// - `aerial`: XYZ tiles at `/tiles/{z}/{x}/{y}.png`
///
/// Parcels come from `/parcels/FeatureServer/0`, falling back to an ArcGIS
/// geocoder at `/geocode/GeocodeServer` whose point lookups go to
/// `/county-parcels/FeatureServer/0`.
pub fn sources_yaml(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!(
        r##"
default_crs: EPSG:4326
buffer_feet: 100
map:
  width_px: 64
  height_px: 48
  dpi: 96
cache:
  ttl_hours: 1
parcels:
  primary:
    kind: feature_service
    url: {base}/parcels/FeatureServer/0
  fallbacks:
    - kind: arcgis_geocoder
      url: {base}/geocode/GeocodeServer
      parcel_layer_url: {base}/county-parcels/FeatureServer/0
layers:
  zoning:
    kind: feature_service
    title: Zoning Districts
    url: {base}/zoning/FeatureServer/0
    native_crs: EPSG:4326
    out_fields: ZONE_CLASS
    style:
      fill_color: "#e4c58f"
  flood:
    kind: flood
    title: FEMA Flood Zones
    url: {base}/flood/MapServer
    native_crs: EPSG:3857
    layers: "28"
  wetlands:
    kind: wms
    url: {base}/wetlands/wms
    native_crs: EPSG:4326
    layers: Wetlands
  aerial:
    kind: raster_tile
    url: {base}/tiles/{{z}}/{{x}}/{{y}}.png
    max_zoom: 19
"##
    )
}

/// [`sources_yaml`] plus a tiled basemap at `/basemap/{z}/{x}/{y}.png`.
pub fn sources_yaml_with_basemap(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!(
        "{}basemap:\n  kind: raster_tile\n  url: {}/basemap/{{z}}/{{x}}/{{y}}.png\n",
        sources_yaml(base_url),
        base
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_bbox_matches_geometry() {
        let bbox = raleigh_lot().bbox().unwrap();
        let (min_x, min_y, max_x, max_y) = place::LOT_BBOX;
        assert_eq!(bbox, BoundingBox::new(min_x, min_y, max_x, max_y));
    }

    #[test]
    fn test_sources_yaml_substitutes_base() {
        let yaml = sources_yaml("http://127.0.0.1:9000/");
        assert!(yaml.contains("url: http://127.0.0.1:9000/zoning/FeatureServer/0"));
        assert!(yaml.contains("http://127.0.0.1:9000/tiles/{z}/{x}/{y}.png"));
    }
}
