//! Synthetic upstream responses.
//!
//! Everything here produces the raw bytes or JSON a GIS service would send,
//! so tests can serve them from a mock server.

use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use parcel_common::Geometry;
use serde_json::{json, Value};
use std::io::Cursor;

/// A GeoJSON Feature with the given properties.
pub fn geojson_feature(geometry: &Geometry, properties: Value) -> Value {
    json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": properties,
    })
}

/// A GeoJSON FeatureCollection body.
pub fn feature_collection(features: Vec<Value>) -> String {
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
    .to_string()
}

/// A parcel record with the default field names of a feature-service source.
pub fn parcel_feature(geometry: &Geometry, apn: &str, address: &str, county: &str) -> Value {
    geojson_feature(
        geometry,
        json!({
            "APN": apn,
            "SITE_ADDRESS": address,
            "COUNTY": county,
        }),
    )
}

/// An ArcGIS REST error body, sent with HTTP 200 as ArcGIS does.
pub fn arcgis_error(code: u16, message: &str) -> String {
    json!({
        "error": {
            "code": code,
            "message": message,
            "details": [],
        }
    })
    .to_string()
}

/// An ArcGIS `findAddressCandidates` body with one candidate.
pub fn address_candidates(address: &str, x: f64, y: f64, score: f64) -> String {
    json!({
        "spatialReference": { "wkid": 4326 },
        "candidates": [{
            "address": address,
            "location": { "x": x, "y": y },
            "score": score,
        }],
    })
    .to_string()
}

/// An OGC ServiceExceptionReport body.
pub fn service_exception(message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ServiceExceptionReport version="1.3.0" xmlns="http://www.opengis.net/ogc">
  <ServiceException code="InvalidParameterValue">{}</ServiceException>
</ServiceExceptionReport>"#,
        message
    )
}

/// PNG bytes of a single-colour image.
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode_png(ImageBuffer::from_pixel(width, height, Rgba(rgba)))
}

/// PNG bytes of vertical stripes cycling through `colors`.
pub fn striped_png(width: u32, height: u32, colors: &[[u8; 4]]) -> Vec<u8> {
    let image = ImageBuffer::from_fn(width, height, |x, _| {
        Rgba(colors[(x as usize) % colors.len().max(1)])
    });
    encode_png(image)
}

fn encode_png(image: RgbaImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .expect("in-memory PNG encoding");
    out.into_inner()
}
