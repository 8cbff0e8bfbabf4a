//! Process settings and source configuration.
//!
//! Settings come from the environment (a `.env` file is loaded by the binary).
//! Source configuration is a YAML file describing the parcel lookup chain,
//! the optional basemap, the data layers and default canvas.

use parcel_common::{AdapterKind, CanvasSpec, CrsCode, LayerSpec, PipelineError, PipelineResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_LIGHTBOX_BASE_URL: &str = "https://api.lightboxre.com/v1";

/// Accepted `output_dpi` range.
pub const DPI_RANGE: std::ops::RangeInclusive<u32> = 72..=600;

/// Accepted canvas edge range in pixels.
pub const CANVAS_RANGE: std::ops::RangeInclusive<u32> = 1..=8192;

/// Environment-provided process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub output_root: PathBuf,
    pub cache_dir: PathBuf,
    pub lightbox_api_key: Option<String>,
    pub lightbox_base_url: String,
    pub arcgis_token: Option<String>,
    pub log_level: String,
    pub max_concurrent_fetches: usize,
    pub request_timeout: Duration,
    /// Timeout of each upstream HTTP call
    pub http_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/sources.yaml"),
            output_root: PathBuf::from("outputs"),
            cache_dir: PathBuf::from("cache/http"),
            lightbox_api_key: None,
            lightbox_base_url: DEFAULT_LIGHTBOX_BASE_URL.to_string(),
            arcgis_token: None,
            log_level: "info".to_string(),
            max_concurrent_fetches: 4,
            request_timeout: Duration::from_secs(120),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    pub fn from_env() -> PipelineResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            config_path: env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_path),
            output_root: env::var("OUTPUT_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            lightbox_api_key: non_empty_var("LIGHTBOX_API_KEY"),
            lightbox_base_url: non_empty_var("LIGHTBOX_BASE_URL").unwrap_or(defaults.lightbox_base_url),
            arcgis_token: non_empty_var("ARCGIS_TOKEN"),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            max_concurrent_fetches: parse_var("MAX_CONCURRENT_FETCHES")?
                .unwrap_or(defaults.max_concurrent_fetches)
                .max(1),
            request_timeout: parse_var("REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            http_timeout: parse_var("HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> PipelineResult<Option<T>> {
    match non_empty_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::Config(format!("{} has invalid value '{}'", name, raw))),
    }
}

/// Default canvas for requests that do not set one.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_width")]
    pub width_px: u32,
    #[serde(default = "default_height")]
    pub height_px: u32,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_width() -> u32 {
    1600
}

fn default_height() -> u32 {
    1200
}

fn default_dpi() -> u32 {
    220
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width_px: default_width(),
            height_px: default_height(),
            dpi: default_dpi(),
        }
    }
}

impl MapConfig {
    pub fn canvas(&self) -> CanvasSpec {
        CanvasSpec::new(self.width_px, self.height_px, self.dpi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime; `null` keeps entries forever
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: Option<u64>,
}

fn default_ttl_hours() -> Option<u64> {
    Some(24 * 7)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_hours
            .map(|h| h.checked_mul(3600).map_or(Duration::MAX, Duration::from_secs))
    }
}

/// One parcel lookup source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParcelSourceConfig {
    /// ArcGIS parcel layer queried by APN or address
    FeatureService {
        url: String,
        #[serde(default = "default_apn_field")]
        apn_field: String,
        #[serde(default = "default_address_field")]
        address_field: String,
        #[serde(default = "default_county_field")]
        county_field: Option<String>,
        /// Output CRS requested from the service; `default_crs` when unset
        #[serde(default)]
        crs: Option<CrsCode>,
    },
    /// LightBox geocode + parcel lookup
    Lightbox {
        /// Overrides `LIGHTBOX_BASE_URL`
        #[serde(default)]
        base_url: Option<String>,
    },
    /// ArcGIS geocoder followed by a point query on a parcel layer
    ArcgisGeocoder {
        url: String,
        parcel_layer_url: String,
        #[serde(default = "default_apn_field")]
        apn_field: String,
        #[serde(default = "default_address_field")]
        address_field: String,
        #[serde(default)]
        crs: Option<CrsCode>,
    },
}

fn default_apn_field() -> String {
    "APN".to_string()
}

fn default_address_field() -> String {
    "SITE_ADDRESS".to_string()
}

fn default_county_field() -> Option<String> {
    Some("COUNTY".to_string())
}

impl ParcelSourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ParcelSourceConfig::FeatureService { .. } => "feature_service",
            ParcelSourceConfig::Lightbox { .. } => "lightbox",
            ParcelSourceConfig::ArcgisGeocoder { .. } => "arcgis_geocoder",
        }
    }

    fn urls(&self) -> Vec<&str> {
        match self {
            ParcelSourceConfig::FeatureService { url, .. } => vec![url],
            ParcelSourceConfig::Lightbox { base_url } => base_url.as_deref().into_iter().collect(),
            ParcelSourceConfig::ArcgisGeocoder {
                url, parcel_layer_url, ..
            } => vec![url, parcel_layer_url],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParcelsConfig {
    pub primary: ParcelSourceConfig,
    #[serde(default)]
    pub fallbacks: Vec<ParcelSourceConfig>,
}

impl ParcelsConfig {
    /// Primary first, then fallbacks in configured order.
    pub fn chain(&self) -> impl Iterator<Item = &ParcelSourceConfig> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }
}

/// The YAML source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_crs")]
    pub default_crs: CrsCode,
    #[serde(default = "default_buffer_feet")]
    pub buffer_feet: f64,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub parcels: ParcelsConfig,
    #[serde(default)]
    pub basemap: Option<LayerSpec>,
    #[serde(default)]
    pub layers: BTreeMap<String, LayerSpec>,
}

fn default_crs() -> CrsCode {
    CrsCode::Wgs84
}

fn default_buffer_feet() -> f64 {
    200.0
}

impl SourceConfig {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml_str(&contents)?;
        info!(
            path = %path.display(),
            layers = config.layers.len(),
            fallbacks = config.parcels.fallbacks.len(),
            basemap = config.basemap.is_some(),
            "Loaded source configuration"
        );
        Ok(config)
    }

    /// Parse and validate. Layer names are filled from their map keys.
    pub fn from_yaml_str(yaml: &str) -> PipelineResult<Self> {
        let mut config: SourceConfig = serde_yaml::from_str(yaml)
            .map_err(|e| PipelineError::Config(format!("invalid source configuration: {}", e)))?;

        for (name, layer) in config.layers.iter_mut() {
            layer.name = name.clone();
        }
        if let Some(basemap) = config.basemap.as_mut() {
            if basemap.name.is_empty() {
                basemap.name = "basemap".to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.buffer_feet.is_finite() && self.buffer_feet >= 0.0) {
            return Err(PipelineError::Config(format!(
                "buffer_feet must be a non-negative number, got {}",
                self.buffer_feet
            )));
        }
        if !DPI_RANGE.contains(&self.map.dpi) {
            return Err(PipelineError::Config(format!(
                "map.dpi must be within {}..={}, got {}",
                DPI_RANGE.start(),
                DPI_RANGE.end(),
                self.map.dpi
            )));
        }
        for (axis, px) in [("width_px", self.map.width_px), ("height_px", self.map.height_px)] {
            if !CANVAS_RANGE.contains(&px) {
                return Err(PipelineError::Config(format!(
                    "map.{} must be within {}..={}, got {}",
                    axis,
                    CANVAS_RANGE.start(),
                    CANVAS_RANGE.end(),
                    px
                )));
            }
        }

        for source in self.parcels.chain() {
            for url in source.urls() {
                check_url(url, &format!("parcel source '{}'", source.kind()))?;
            }
        }

        for layer in self.layers.values().chain(self.basemap.iter()) {
            layer.validate()?;
            if !layer.is_tile_template() {
                check_url(&layer.source_url, &format!("layer '{}'", layer.name))?;
            }
        }
        if let Some(basemap) = &self.basemap {
            if basemap.adapter_kind == AdapterKind::FeatureService {
                return Err(PipelineError::Config(
                    "basemap must be a wms or raster source".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.layers.get(name)
    }
}

fn check_url(raw: &str, what: &str) -> PipelineResult<()> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| PipelineError::Config(format!("{} has invalid url '{}': {}", what, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: &str = r##"
default_crs: EPSG:2264
buffer_feet: 50
map:
  width_px: 800
  height_px: 600
  dpi: 150
cache:
  ttl_hours: 12
parcels:
  primary:
    kind: feature_service
    url: https://gis.example.com/arcgis/rest/services/Parcels/FeatureServer/0
    apn_field: PIN
  fallbacks:
    - kind: lightbox
    - kind: arcgis_geocoder
      url: https://geocode.example.com/arcgis/rest/services/World/GeocodeServer
      parcel_layer_url: https://gis.example.com/arcgis/rest/services/Parcels/FeatureServer/0
layers:
  zoning:
    kind: feature_service
    url: https://gis.example.com/arcgis/rest/services/Zoning/FeatureServer/0
    native_crs: EPSG:2264
    style:
      fill_color: "#e4c58f"
  flood:
    kind: flood
    url: https://hazards.example.com/arcgis/rest/services/NFHL/MapServer
    native_crs: EPSG:3857
    layers: "28"
  aerial:
    kind: raster_tile
    url: https://{s}.tiles.example.com/{z}/{x}/{y}.png
"##;

    #[test]
    fn test_parse_sources() {
        let config = SourceConfig::from_yaml_str(SOURCES).unwrap();
        assert_eq!(config.default_crs.epsg(), 2264);
        assert_eq!(config.buffer_feet, 50.0);
        assert_eq!(config.map.canvas(), CanvasSpec::new(800, 600, 150));
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(12 * 3600)));

        let zoning = config.layer("zoning").unwrap();
        assert_eq!(zoning.name, "zoning");
        assert_eq!(zoning.adapter_kind, AdapterKind::FeatureService);
        assert!(config.layer("aerial").unwrap().is_tile_template());

        let kinds: Vec<&str> = config.parcels.chain().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec!["feature_service", "lightbox", "arcgis_geocoder"]);
        match &config.parcels.primary {
            ParcelSourceConfig::FeatureService {
                apn_field,
                address_field,
                county_field,
                ..
            } => {
                assert_eq!(apn_field, "PIN");
                assert_eq!(address_field, "SITE_ADDRESS");
                assert_eq!(county_field.as_deref(), Some("COUNTY"));
            }
            other => panic!("unexpected primary {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = SourceConfig::from_yaml_str(
            "parcels:\n  primary:\n    kind: lightbox\n",
        )
        .unwrap();
        assert_eq!(config.default_crs, CrsCode::Wgs84);
        assert_eq!(config.buffer_feet, 200.0);
        assert_eq!(config.map, MapConfig::default());
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(7 * 24 * 3600)));
        assert!(config.layers.is_empty());
    }

    #[test]
    fn test_null_ttl_never_expires() {
        let config = SourceConfig::from_yaml_str(
            "cache:\n  ttl_hours: null\nparcels:\n  primary:\n    kind: lightbox\n",
        )
        .unwrap();
        assert_eq!(config.cache.ttl(), None);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let config = SourceConfig::from_yaml_str(
            "cache:\n  ttl_hours: 18446744073709551615\nparcels:\n  primary:\n    kind: lightbox\n",
        )
        .unwrap();
        assert_eq!(config.cache.ttl(), Some(Duration::MAX));
    }

    #[test]
    fn test_rejects_unknown_kind_and_crs() {
        let bad_kind = SOURCES.replace("kind: flood", "kind: lidar");
        assert!(matches!(SourceConfig::from_yaml_str(&bad_kind), Err(PipelineError::Config(_))));

        let bad_crs = SOURCES.replace("native_crs: EPSG:3857", "native_crs: EPSG:27700");
        assert!(matches!(SourceConfig::from_yaml_str(&bad_crs), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_rejects_wms_without_layers() {
        let yaml = format!(
            "{}  hillshade:\n    kind: wms\n    url: https://wms.example.com/wms\n",
            SOURCES
        );
        let err = SourceConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("hillshade"), "{}", err);
    }

    #[test]
    fn test_rejects_bad_url_and_dpi() {
        let bad_url = SOURCES.replace(
            "https://hazards.example.com/arcgis/rest/services/NFHL/MapServer",
            "not a url",
        );
        assert!(SourceConfig::from_yaml_str(&bad_url).is_err());

        let bad_dpi = SOURCES.replace("dpi: 150", "dpi: 1200");
        assert!(SourceConfig::from_yaml_str(&bad_dpi).is_err());
    }
}
