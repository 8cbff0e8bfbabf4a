//! Layer definitions loaded from the source configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CrsCode, LayerStyle, PipelineError};

/// The kind of upstream source a layer is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// ArcGIS FeatureServer/MapServer layer queried for vector features
    #[serde(alias = "feature-service", alias = "arcgis_feature")]
    FeatureService,
    /// OGC WMS GetMap
    Wms,
    /// XYZ tile template or ArcGIS export endpoint
    #[serde(alias = "raster-tile", alias = "tile")]
    RasterTile,
    Contour,
    Soils,
    Flood,
}

impl AdapterKind {
    /// Kinds served by the raster/tile adapter.
    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            AdapterKind::RasterTile | AdapterKind::Contour | AdapterKind::Soils | AdapterKind::Flood
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::FeatureService => "feature_service",
            AdapterKind::Wms => "wms",
            AdapterKind::RasterTile => "raster_tile",
            AdapterKind::Contour => "contour",
            AdapterKind::Soils => "soils",
            AdapterKind::Flood => "flood",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured data layer. Read-only once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Layer name; filled from the configuration map key
    #[serde(default)]
    pub name: String,

    /// Human-readable title for page headers
    #[serde(default)]
    pub title: Option<String>,

    #[serde(rename = "kind")]
    pub adapter_kind: AdapterKind,

    /// Service endpoint or tile URL template
    #[serde(rename = "url")]
    pub source_url: String,

    /// CRS the upstream service is queried in
    #[serde(default = "default_native_crs")]
    pub native_crs: CrsCode,

    #[serde(default)]
    pub style: LayerStyle,

    /// WMS `LAYERS` (required for WMS sources)
    #[serde(default)]
    pub layers: Option<String>,

    /// WMS `STYLES`
    #[serde(default)]
    pub styles: Option<String>,

    /// WMS protocol version, "1.3.0" when unset
    #[serde(default)]
    pub version: Option<String>,

    /// Feature service `outFields`
    #[serde(default)]
    pub out_fields: Option<String>,

    /// Feature service `where` clause
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,

    #[serde(default)]
    pub min_zoom: u32,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: u32,

    /// Values substituted for `{s}` in tile templates
    #[serde(default)]
    pub subdomains: Vec<String>,
}

fn default_native_crs() -> CrsCode {
    CrsCode::Wgs84
}

fn default_max_zoom() -> u32 {
    19
}

impl LayerSpec {
    /// Title if configured, otherwise the layer name.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// True when the source URL is an XYZ tile template.
    pub fn is_tile_template(&self) -> bool {
        self.source_url.contains("{z}")
            && self.source_url.contains("{x}")
            && self.source_url.contains("{y}")
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: String| PipelineError::Config(format!("layer '{}': {}", self.name, msg));

        if self.name.trim().is_empty() {
            return Err(PipelineError::Config("layer with empty name".to_string()));
        }
        if self.source_url.trim().is_empty() {
            return Err(fail("url is empty".to_string()));
        }
        if self.adapter_kind == AdapterKind::Wms
            && self.layers.as_deref().map_or(true, |l| l.trim().is_empty())
        {
            return Err(fail("WMS sources require 'layers'".to_string()));
        }
        if self.min_zoom > self.max_zoom || self.max_zoom > 24 {
            return Err(fail(format!(
                "invalid zoom range {}..{}",
                self.min_zoom, self.max_zoom
            )));
        }
        self.style.validate().map_err(fail)
    }
}
