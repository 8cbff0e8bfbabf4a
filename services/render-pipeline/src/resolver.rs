//! Parcel resolution through an ordered chain of lookup sources.

use gis_protocol::arcgis::{self, Params};
use gis_protocol::geocode;
use http_cache::CachedClient;
use parcel_common::{CrsCode, Feature, Parcel, PipelineError, PipelineResult, RenderRequest};
use tracing::{debug, info, instrument, warn};

use crate::config::{ParcelSourceConfig, ParcelsConfig, Settings};
use crate::error::{SourceError, SourceResult};

/// What is being looked up.
#[derive(Debug, Clone, Copy)]
enum Query<'a> {
    Apn(&'a str),
    Address(&'a str),
}

/// Resolves an address or APN into a [`Parcel`].
///
/// Sources are tried strictly in order. The first source is the primary: if
/// it returns several matches the request's county must single one out.
/// Fallbacks only run after the primary errors or finds nothing.
#[derive(Clone)]
pub struct ParcelResolver {
    client: CachedClient,
    sources: Vec<ParcelSourceConfig>,
    default_crs: CrsCode,
    lightbox_base_url: String,
    lightbox_api_key: Option<String>,
    arcgis_token: Option<String>,
}

impl ParcelResolver {
    pub fn new(client: CachedClient, parcels: &ParcelsConfig, default_crs: CrsCode, settings: &Settings) -> Self {
        Self {
            client,
            sources: parcels.chain().cloned().collect(),
            default_crs,
            lightbox_base_url: settings.lightbox_base_url.clone(),
            lightbox_api_key: settings.lightbox_api_key.clone(),
            arcgis_token: settings.arcgis_token.clone(),
        }
    }

    #[instrument(skip(self, request), fields(parcel = %request.identifier()))]
    pub async fn resolve(&self, request: &RenderRequest) -> PipelineResult<Parcel> {
        let query = match (request.apn(), request.address()) {
            (Some(apn), _) => Query::Apn(apn),
            (None, Some(address)) => Query::Address(address),
            (None, None) => {
                return Err(PipelineError::InvalidRequest(
                    "either address or apn is required".to_string(),
                ))
            }
        };

        let mut attempts = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter().enumerate() {
            let kind = source.kind();
            if matches!(query, Query::Apn(_)) && !matches!(source, ParcelSourceConfig::FeatureService { .. }) {
                debug!(source = kind, "Source cannot look up APNs, skipping");
                attempts.push(format!("{} (APN lookup unsupported)", kind));
                continue;
            }

            match self.lookup(source, query).await {
                Ok(matches) if matches.is_empty() => {
                    info!(source = kind, "No parcel match");
                    attempts.push(format!("{} (no match)", kind));
                }
                Ok(matches) => {
                    let parcel = if index == 0 {
                        disambiguate(matches, request.county.as_deref(), &request.identifier())?
                    } else {
                        first(matches)
                    };
                    info!(
                        source = kind,
                        apn = parcel.apn.as_deref().unwrap_or(""),
                        crs = %parcel.crs,
                        "Parcel resolved"
                    );
                    return Ok(parcel);
                }
                Err(e) => {
                    warn!(source = kind, error = %e, "Parcel lookup failed");
                    attempts.push(format!("{} ({})", kind, e));
                }
            }
        }

        Err(PipelineError::ParcelNotFound(format!(
            "{}; tried {}",
            request.identifier(),
            attempts.join(", ")
        )))
    }

    async fn lookup(&self, source: &ParcelSourceConfig, query: Query<'_>) -> SourceResult<Vec<Parcel>> {
        match source {
            ParcelSourceConfig::FeatureService {
                url,
                apn_field,
                address_field,
                county_field,
                crs,
            } => {
                let out_crs = crs.unwrap_or(self.default_crs);
                let where_clause = match query {
                    Query::Apn(apn) => arcgis::apn_where(apn_field, apn),
                    Query::Address(address) => arcgis::address_where(address_field, address),
                };
                let params = self.with_token(arcgis::where_query_params(&where_clause, out_crs));
                let body = self.client.get(&arcgis::query_url(url), &params).await?;
                let fields = Fields {
                    apn: apn_field,
                    address: address_field,
                    county: county_field.as_deref(),
                };
                Ok(to_parcels(arcgis::parse_feature_collection(&body)?, out_crs, &fields, source.kind()))
            }
            ParcelSourceConfig::Lightbox { base_url } => {
                let Query::Address(address) = query else {
                    return Ok(Vec::new());
                };
                self.lightbox(base_url.as_deref().unwrap_or(&self.lightbox_base_url), address)
                    .await
            }
            ParcelSourceConfig::ArcgisGeocoder {
                url,
                parcel_layer_url,
                apn_field,
                address_field,
                crs,
            } => {
                let Query::Address(address) = query else {
                    return Ok(Vec::new());
                };
                let params = self.with_token(geocode::find_candidates_params(address));
                let body = self.client.get(&geocode::find_candidates_url(url), &params).await?;
                let Some(best) = geocode::parse_address_candidates(&body)?.into_iter().next() else {
                    return Ok(Vec::new());
                };
                debug!(candidate = %best.address, score = best.score, "Geocoded address");

                let out_crs = crs.unwrap_or(self.default_crs);
                let params = self.with_token(arcgis::point_query_params(
                    best.location.x,
                    best.location.y,
                    CrsCode::Wgs84,
                    out_crs,
                ));
                let body = self.client.get(&arcgis::query_url(parcel_layer_url), &params).await?;
                let fields = Fields {
                    apn: apn_field,
                    address: address_field,
                    county: None,
                };
                let mut parcels = to_parcels(arcgis::parse_feature_collection(&body)?, out_crs, &fields, source.kind());
                for parcel in &mut parcels {
                    parcel.address.get_or_insert_with(|| best.address.clone());
                }
                Ok(parcels)
            }
        }
    }

    async fn lightbox(&self, base_url: &str, address: &str) -> SourceResult<Vec<Parcel>> {
        let key = self
            .lightbox_api_key
            .as_deref()
            .ok_or_else(|| SourceError::NotConfigured("LIGHTBOX_API_KEY is not set".to_string()))?;
        let headers = [("Authorization", format!("Bearer {}", key))];

        let geocode_url = format!("{}/geocode", base_url.trim_end_matches('/'));
        let body = self
            .client
            .post_json(&geocode_url, &geocode::lightbox_geocode_body(address, 1), &headers)
            .await?;
        let Some(candidate) = geocode::parse_lightbox_candidates(&body)?.into_iter().next() else {
            return Ok(Vec::new());
        };

        let no_params: &[(&str, &str)] = &[];
        let body = self
            .client
            .get_with_headers(
                &geocode::lightbox_parcel_url(base_url, &candidate.parcel_id),
                no_params,
                &headers,
            )
            .await?;
        let record = geocode::parse_lightbox_parcel(&body)?;
        let Some(geometry) = record.geometry.filter(|g| g.is_polygonal()) else {
            return Err(SourceError::Empty(format!(
                "LightBox parcel {} has no polygon geometry",
                candidate.parcel_id
            )));
        };

        let mut attributes = serde_json::Map::new();
        attributes.insert("parcelId".to_string(), candidate.parcel_id.into());
        Ok(vec![Parcel {
            apn: record.apn,
            address: record.site_address.or(candidate.address),
            county: record.county,
            geometry,
            crs: CrsCode::Wgs84,
            source: "lightbox".to_string(),
            attributes,
        }])
    }

    /// Credentials ride along as a query parameter, outside the cache key.
    fn with_token(&self, mut params: Params) -> Params {
        if let Some(token) = &self.arcgis_token {
            params.push(("token", token.clone()));
        }
        params
    }
}

struct Fields<'a> {
    apn: &'a str,
    address: &'a str,
    county: Option<&'a str>,
}

fn to_parcels(features: Vec<Feature>, crs: CrsCode, fields: &Fields<'_>, source: &str) -> Vec<Parcel> {
    features
        .into_iter()
        .filter(|f| {
            let keep = f.geometry.is_polygonal() && !f.geometry.is_empty();
            if !keep {
                debug!(geometry = f.geometry.type_name(), "Skipping non-polygon parcel feature");
            }
            keep
        })
        .map(|f| Parcel {
            apn: f.property_str(fields.apn),
            address: f.property_str(fields.address),
            county: fields.county.and_then(|c| f.property_str(c)),
            geometry: f.geometry,
            crs,
            source: source.to_string(),
            attributes: f.properties,
        })
        .collect()
}

fn first(mut matches: Vec<Parcel>) -> Parcel {
    matches.swap_remove(0)
}

/// Pick the single primary match, using the county when there are several.
fn disambiguate(matches: Vec<Parcel>, county: Option<&str>, identifier: &str) -> PipelineResult<Parcel> {
    if matches.len() == 1 {
        return Ok(first(matches));
    }
    let total = matches.len();
    let Some(county) = county.map(str::trim).filter(|c| !c.is_empty()) else {
        return Err(PipelineError::AmbiguousParcel(format!(
            "{} matched {} parcels; supply a county to disambiguate",
            identifier, total
        )));
    };

    let mut survivors: Vec<Parcel> = matches
        .into_iter()
        .filter(|p| p.county.as_deref().is_some_and(|c| c.trim().eq_ignore_ascii_case(county)))
        .collect();
    if survivors.len() == 1 {
        return Ok(survivors.swap_remove(0));
    }
    Err(PipelineError::AmbiguousParcel(format!(
        "{} matched {} parcels, {} of them in county '{}'",
        identifier,
        total,
        survivors.len(),
        county
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_common::{BoundingBox, Geometry};

    fn parcel(apn: &str, county: Option<&str>) -> Parcel {
        Parcel {
            apn: Some(apn.to_string()),
            address: Some("123 Main St".to_string()),
            county: county.map(str::to_string),
            geometry: Geometry::from_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
            crs: CrsCode::Wgs84,
            source: "feature_service".to_string(),
            attributes: Default::default(),
        }
    }

    #[test]
    fn test_single_match_needs_no_county() {
        let p = disambiguate(vec![parcel("1", None)], None, "x").unwrap();
        assert_eq!(p.apn.as_deref(), Some("1"));
    }

    #[test]
    fn test_multiple_matches_without_county_is_ambiguous() {
        let err = disambiguate(vec![parcel("1", Some("Wake")), parcel("2", Some("Durham"))], None, "x")
            .unwrap_err();
        assert!(matches!(err, PipelineError::AmbiguousParcel(_)));
        assert_eq!(err.http_status_code(), 409);
    }

    #[test]
    fn test_county_picks_one_case_insensitively() {
        let p = disambiguate(
            vec![parcel("1", Some("Wake")), parcel("2", Some("Durham"))],
            Some(" durham "),
            "x",
        )
        .unwrap();
        assert_eq!(p.apn.as_deref(), Some("2"));
    }

    #[test]
    fn test_county_matching_several_is_still_ambiguous() {
        let err = disambiguate(
            vec![parcel("1", Some("Wake")), parcel("2", Some("WAKE")), parcel("3", None)],
            Some("Wake"),
            "x",
        )
        .unwrap_err();
        assert!(err.to_string().contains("2 of them"), "{}", err);
    }

    #[test]
    fn test_to_parcels_maps_fields_and_skips_points() {
        let mut props = serde_json::Map::new();
        props.insert("PIN".to_string(), "0794172843".into());
        props.insert("SITE_ADDRESS".to_string(), "123 MAIN ST".into());
        props.insert("COUNTY".to_string(), "Wake".into());
        let features = vec![
            Feature {
                geometry: Geometry::from_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
                properties: props,
            },
            Feature {
                geometry: Geometry::Point(parcel_common::Position::new(0.5, 0.5)),
                properties: Default::default(),
            },
        ];
        let fields = Fields {
            apn: "PIN",
            address: "SITE_ADDRESS",
            county: Some("COUNTY"),
        };
        let parcels = to_parcels(features, CrsCode::WebMercator, &fields, "feature_service");
        assert_eq!(parcels.len(), 1);
        assert_eq!(parcels[0].apn.as_deref(), Some("0794172843"));
        assert_eq!(parcels[0].county.as_deref(), Some("Wake"));
        assert_eq!(parcels[0].crs, CrsCode::WebMercator);
    }
}
