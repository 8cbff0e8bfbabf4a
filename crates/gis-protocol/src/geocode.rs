//! Geocoder payloads: LightBox parcel API and ArcGIS `findAddressCandidates`.

use parcel_common::Geometry;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::arcgis::{check_error, Params};
use crate::{ProtocolError, ProtocolResult};

/// Body of a LightBox `POST /geocode`.
pub fn lightbox_geocode_body(address: &str, limit: u32) -> Value {
    json!({ "address": address.trim(), "limit": limit })
}

/// URL of a LightBox parcel record.
pub fn lightbox_parcel_url(base_url: &str, parcel_id: &str) -> String {
    format!("{}/parcels/{}", base_url.trim_end_matches('/'), parcel_id)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightboxCandidate {
    pub parcel_id: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LightboxGeocodeResponse {
    #[serde(default)]
    results: Vec<LightboxCandidate>,
}

/// Candidates of a LightBox geocode response; empty when nothing matched.
pub fn parse_lightbox_candidates(body: &[u8]) -> ProtocolResult<Vec<LightboxCandidate>> {
    let response: LightboxGeocodeResponse = serde_json::from_slice(body)
        .map_err(|e| ProtocolError::InvalidResponse(format!("LightBox geocode: {}", e)))?;
    Ok(response.results)
}

/// A LightBox parcel record. Geometry is GeoJSON in EPSG:4326.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightboxParcel {
    #[serde(default)]
    pub apn: Option<String>,
    #[serde(default)]
    pub site_address: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    pub geometry: Option<Geometry>,
}

pub fn parse_lightbox_parcel(body: &[u8]) -> ProtocolResult<LightboxParcel> {
    let parcel: LightboxParcel = serde_json::from_slice(body)
        .map_err(|e| ProtocolError::InvalidResponse(format!("LightBox parcel: {}", e)))?;
    if parcel.geometry.is_none() {
        return Err(ProtocolError::InvalidGeometry("LightBox parcel has no geometry".to_string()));
    }
    Ok(parcel)
}

/// `<locator>/findAddressCandidates`, unless already present.
pub fn find_candidates_url(locator_url: &str) -> String {
    let base = locator_url.trim_end_matches('/');
    if base.ends_with("/findAddressCandidates") {
        base.to_string()
    } else {
        format!("{}/findAddressCandidates", base)
    }
}

/// Single-line address search returning WGS84 points.
pub fn find_candidates_params(address: &str) -> Params {
    vec![
        ("SingleLine", address.trim().to_string()),
        ("outSR", "4326".to_string()),
        ("maxLocations", "1".to_string()),
        ("outFields", "Match_addr,Addr_type".to_string()),
        ("f", "json".to_string()),
    ]
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddressCandidate {
    #[serde(default)]
    pub address: String,
    pub location: CandidateLocation,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CandidateLocation {
    pub x: f64,
    pub y: f64,
}

/// Address candidates, best score first.
pub fn parse_address_candidates(body: &[u8]) -> ProtocolResult<Vec<AddressCandidate>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProtocolError::InvalidResponse(format!("geocoder: {}", e)))?;
    check_error(&value)?;

    let raw = value
        .get("candidates")
        .cloned()
        .ok_or_else(|| ProtocolError::InvalidResponse("geocoder response has no 'candidates'".to_string()))?;
    let mut candidates: Vec<AddressCandidate> = serde_json::from_value(raw)
        .map_err(|e| ProtocolError::InvalidResponse(format!("geocoder candidates: {}", e)))?;

    candidates.retain(|c| c.location.x.is_finite() && c.location.y.is_finite());
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(candidates)
}
