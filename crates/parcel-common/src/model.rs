//! Request, parcel and result models passed between pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::{BoundingBox, CrsCode, Feature, Geometry};

/// A resolved parcel. Immutable once returned by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub apn: Option<String>,
    pub address: Option<String>,
    pub county: Option<String>,
    /// Boundary in `crs`
    pub geometry: Geometry,
    /// Native CRS of the geometry; the working CRS for the request
    pub crs: CrsCode,
    /// Name of the lookup source that produced the match
    pub source: String,
    /// Remaining attributes from the lookup source
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Parcel {
    pub fn summary(&self) -> ParcelSummary {
        ParcelSummary {
            apn: self.apn.clone(),
            address: self.address.clone(),
            county: self.county.clone(),
            crs: self.crs.to_string(),
        }
    }

    /// Filesystem-safe label for output directories: APN, else address.
    pub fn label(&self) -> String {
        let raw = self
            .apn
            .as_deref()
            .or(self.address.as_deref())
            .unwrap_or("parcel");
        sanitize_label(raw)
    }
}

/// Replace anything other than ASCII alphanumerics, `-` and `_` with `_`.
pub fn sanitize_label(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "parcel".to_string()
    } else {
        trimmed.chars().take(80).collect()
    }
}

/// Inbound render request. Defaults for unset fields come from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub apn: Option<String>,
    /// Disambiguates multiple primary matches
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub buffer_feet: Option<f64>,
    #[serde(default)]
    pub output_dpi: Option<u32>,
    #[serde(default)]
    pub canvas_width_px: Option<u32>,
    #[serde(default)]
    pub canvas_height_px: Option<u32>,
}

impl RenderRequest {
    pub fn for_address(address: impl Into<String>, layers: &[&str]) -> Self {
        Self {
            address: Some(address.into()),
            layers: layers.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn for_apn(apn: impl Into<String>, layers: &[&str]) -> Self {
        Self {
            apn: Some(apn.into()),
            layers: layers.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Trimmed, non-empty address.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Trimmed, non-empty APN.
    pub fn apn(&self) -> Option<&str> {
        self.apn.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Human-readable identifier for logs and errors.
    pub fn identifier(&self) -> String {
        match (self.apn(), self.address()) {
            (Some(apn), _) => format!("APN {}", apn),
            (None, Some(addr)) => format!("address '{}'", addr),
            (None, None) => "<no identifier>".to_string(),
        }
    }
}

/// Output canvas dimensions shared by every image of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSpec {
    pub width_px: u32,
    pub height_px: u32,
    pub dpi: u32,
}

impl CanvasSpec {
    pub fn new(width_px: u32, height_px: u32, dpi: u32) -> Self {
        Self {
            width_px,
            height_px,
            dpi,
        }
    }

    /// Width / height.
    pub fn aspect(&self) -> f64 {
        self.width_px as f64 / self.height_px.max(1) as f64
    }

    /// Factor applied to style sizes given at 96 dpi.
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / 96.0
    }
}

/// Straight-alpha RGBA raster aligned to the request canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOverlay {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8, `width * height * 4` bytes
    pub data: Vec<u8>,
}

impl RasterOverlay {
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// True when the buffer length matches the dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * 4
    }

    /// True when every pixel is fully transparent.
    pub fn is_blank(&self) -> bool {
        self.data.chunks_exact(4).all(|px| px[3] == 0)
    }
}

/// Normalized data for one layer, in the working CRS.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerPayload {
    Features(Vec<Feature>),
    Raster(RasterOverlay),
}

/// Outcome of one adapter fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Success { layer: String, payload: LayerPayload },
    Failed { layer: String, warning: String },
}

impl FetchResult {
    pub fn failed(layer: &str, reason: impl std::fmt::Display) -> Self {
        FetchResult::Failed {
            layer: layer.to_string(),
            warning: format!("Layer '{}' failed: {}", layer, reason),
        }
    }

    pub fn layer(&self) -> &str {
        match self {
            FetchResult::Success { layer, .. } | FetchResult::Failed { layer, .. } => layer,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}

/// Terminal artifact of one request.
#[derive(Debug, Clone, Serialize)]
pub struct RenderResult {
    pub request_id: Uuid,
    pub parcel: Parcel,
    /// Shared extent of every image, in the parcel CRS
    pub extent: BoundingBox,
    pub canvas: CanvasSpec,
    pub images: BTreeMap<String, PathBuf>,
    pub contact_sheet: Option<PathBuf>,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl RenderResult {
    /// Outbound shape, with paths under `output_root` rewritten below `public_prefix`.
    pub fn to_response(&self, output_root: &Path, public_prefix: &str) -> RenderResponse {
        let publish = |path: &Path| public_path(path, output_root, public_prefix);
        RenderResponse {
            parcel: self.parcel.summary(),
            created_at: self.created_at,
            images: self
                .images
                .iter()
                .map(|(name, path)| (name.clone(), publish(path)))
                .collect(),
            contact_sheet: self.contact_sheet.as_deref().map(publish),
            warnings: self.warnings.clone(),
        }
    }
}

fn public_path(path: &Path, output_root: &Path, public_prefix: &str) -> String {
    match path.strip_prefix(output_root) {
        Ok(rel) => {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            format!("{}/{}", public_prefix.trim_end_matches('/'), parts.join("/"))
        }
        Err(_) => path.display().to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelSummary {
    pub apn: Option<String>,
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    pub crs: String,
}

/// JSON body returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResponse {
    pub parcel: ParcelSummary,
    pub created_at: DateTime<Utc>,
    pub images: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_sheet: Option<String>,
    pub warnings: Vec<String>,
}
