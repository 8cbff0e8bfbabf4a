//! ArcGIS REST: feature layer queries and map/image exports.

use parcel_common::{BoundingBox, CrsCode, Feature, Geometry};
use serde_json::{json, Map, Value};

use crate::{ProtocolError, ProtocolResult};

/// Query parameter list, ready for the HTTP client.
pub type Params = Vec<(&'static str, String)>;

/// `<layer>/query`, unless the URL already points at it.
pub fn query_url(layer_url: &str) -> String {
    let base = layer_url.trim_end_matches('/');
    if base.ends_with("/query") {
        base.to_string()
    } else {
        format!("{}/query", base)
    }
}

/// `export` for MapServer, `exportImage` for ImageServer, unless the URL
/// already names the operation.
pub fn export_url(service_url: &str) -> String {
    let base = service_url.trim_end_matches('/');
    if base.ends_with("/export") || base.ends_with("/exportImage") {
        base.to_string()
    } else if base.contains("/ImageServer") {
        format!("{}/exportImage", base)
    } else {
        format!("{}/export", base)
    }
}

/// Envelope geometry JSON with its spatial reference.
pub fn envelope_json(extent: &BoundingBox, crs: CrsCode) -> String {
    json!({
        "xmin": extent.min_x,
        "ymin": extent.min_y,
        "xmax": extent.max_x,
        "ymax": extent.max_y,
        "spatialReference": { "wkid": crs.epsg() },
    })
    .to_string()
}

/// Quote a string for a SQL `where` clause.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `<field>='<apn>'`
pub fn apn_where(field: &str, apn: &str) -> String {
    format!("{}={}", field, sql_literal(apn.trim()))
}

/// Case-insensitive substring match on an address field.
pub fn address_where(field: &str, address: &str) -> String {
    let pattern = format!("%{}%", address.trim().to_uppercase());
    format!("UPPER({}) LIKE {}", field, sql_literal(&pattern))
}

/// Features intersecting an envelope.
pub fn envelope_query_params(
    extent: &BoundingBox,
    extent_crs: CrsCode,
    out_crs: CrsCode,
    out_fields: Option<&str>,
    where_clause: Option<&str>,
) -> Params {
    vec![
        ("f", "geojson".to_string()),
        ("geometry", envelope_json(extent, extent_crs)),
        ("geometryType", "esriGeometryEnvelope".to_string()),
        ("inSR", extent_crs.epsg().to_string()),
        ("outSR", out_crs.epsg().to_string()),
        ("spatialRel", "esriSpatialRelIntersects".to_string()),
        ("outFields", out_fields.unwrap_or("*").to_string()),
        ("where", where_clause.unwrap_or("1=1").to_string()),
        ("returnGeometry", "true".to_string()),
    ]
}

/// Features matching an attribute filter.
pub fn where_query_params(where_clause: &str, out_crs: CrsCode) -> Params {
    vec![
        ("f", "geojson".to_string()),
        ("where", where_clause.to_string()),
        ("outFields", "*".to_string()),
        ("outSR", out_crs.epsg().to_string()),
        ("returnGeometry", "true".to_string()),
    ]
}

/// Features containing a point.
pub fn point_query_params(x: f64, y: f64, point_crs: CrsCode, out_crs: CrsCode) -> Params {
    let point = json!({ "x": x, "y": y, "spatialReference": { "wkid": point_crs.epsg() } });
    vec![
        ("f", "geojson".to_string()),
        ("geometry", point.to_string()),
        ("geometryType", "esriGeometryPoint".to_string()),
        ("inSR", point_crs.epsg().to_string()),
        ("outSR", out_crs.epsg().to_string()),
        ("spatialRel", "esriSpatialRelIntersects".to_string()),
        ("outFields", "*".to_string()),
        ("where", "1=1".to_string()),
        ("returnGeometry", "true".to_string()),
    ]
}

/// Rendered PNG of a MapServer or ImageServer for an extent.
pub fn export_params(
    extent: &BoundingBox,
    crs: CrsCode,
    width: u32,
    height: u32,
    dpi: u32,
    layers: Option<&str>,
) -> Params {
    let epsg = crs.epsg().to_string();
    let mut params = vec![
        ("bbox", extent.to_xy_string()),
        ("bboxSR", epsg.clone()),
        ("imageSR", epsg),
        ("size", format!("{},{}", width, height)),
        ("dpi", dpi.to_string()),
        ("format", "png32".to_string()),
        ("transparent", "true".to_string()),
        ("f", "image".to_string()),
    ];
    if let Some(layers) = layers.filter(|l| !l.trim().is_empty()) {
        params.push(("layers", format!("show:{}", layers.trim())));
    }
    params
}

/// Fail on an ArcGIS `{"error": {...}}` body.
pub fn check_error(body: &Value) -> ProtocolResult<()> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let mut message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let details: Vec<&str> = error
        .get("details")
        .and_then(Value::as_array)
        .map(|d| d.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !details.is_empty() {
        message = format!("{} ({})", message, details.join("; "));
    }
    Err(ProtocolError::ArcGis { code, message })
}

/// Parse a GeoJSON FeatureCollection returned by a `query` with `f=geojson`.
///
/// Features without geometry are skipped. A geometry that is present but
/// cannot be read fails the whole response.
pub fn parse_feature_collection(body: &[u8]) -> ProtocolResult<Vec<Feature>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProtocolError::InvalidResponse(format!("body is not JSON: {}", e)))?;
    check_error(&value)?;

    let features = value
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| ProtocolError::InvalidResponse("response has no 'features' array".to_string()))?;

    let mut out = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let geometry = match feature.get("geometry") {
            None | Some(Value::Null) => continue,
            Some(g) => serde_json::from_value::<Geometry>(g.clone()).map_err(|e| {
                ProtocolError::InvalidGeometry(format!("feature {}: {}", i, e))
            })?,
        };
        let properties = match feature.get("properties") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        out.push(Feature { geometry, properties });
    }
    Ok(out)
}
