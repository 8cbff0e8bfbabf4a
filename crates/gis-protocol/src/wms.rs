//! OGC WMS GetMap requests and response checks.
//!
//! Supports WMS 1.1.1 and 1.3.0. The two differ in the CRS parameter name
//! (`SRS` vs `CRS`) and in axis order: 1.3.0 uses latitude-first bounding
//! boxes for geographic CRSs.

use parcel_common::{BoundingBox, CrsCode};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::arcgis::Params;
use crate::{ProtocolError, ProtocolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WmsVersion {
    V111,
    #[default]
    V130,
}

impl WmsVersion {
    /// Parse a configured version string; anything but 1.1.x means 1.3.0.
    pub fn parse(version: Option<&str>) -> Self {
        match version.map(str::trim) {
            Some(v) if v.starts_with("1.1") => WmsVersion::V111,
            _ => WmsVersion::V130,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WmsVersion::V111 => "1.1.1",
            WmsVersion::V130 => "1.3.0",
        }
    }
}

/// GetMap parameters for one image.
#[derive(Debug, Clone)]
pub struct GetMapRequest {
    pub layers: String,
    pub styles: String,
    pub version: WmsVersion,
    pub crs: CrsCode,
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
}

impl GetMapRequest {
    /// BBOX value in the axis order the version expects.
    pub fn bbox_param(&self) -> String {
        if self.version == WmsVersion::V130 && self.crs.is_geographic() {
            self.bbox.to_yx_string()
        } else {
            self.bbox.to_xy_string()
        }
    }

    pub fn to_params(&self) -> Params {
        let crs_key = match self.version {
            WmsVersion::V111 => "SRS",
            WmsVersion::V130 => "CRS",
        };
        vec![
            ("SERVICE", "WMS".to_string()),
            ("REQUEST", "GetMap".to_string()),
            ("VERSION", self.version.as_str().to_string()),
            ("LAYERS", self.layers.clone()),
            ("STYLES", self.styles.clone()),
            (crs_key, self.crs.to_string()),
            ("BBOX", self.bbox_param()),
            ("WIDTH", self.width.to_string()),
            ("HEIGHT", self.height.to_string()),
            ("FORMAT", "image/png".to_string()),
            ("TRANSPARENT", "TRUE".to_string()),
        ]
    }
}

/// Detected encoding of an image body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Tiff,
}

/// Sniff the magic number of an image response.
pub fn sniff_image(body: &[u8]) -> Option<ImageKind> {
    if body.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageKind::Png)
    } else if body.starts_with(&[0xff, 0xd8, 0xff]) {
        Some(ImageKind::Jpeg)
    } else if body.starts_with(b"GIF87a") || body.starts_with(b"GIF89a") {
        Some(ImageKind::Gif)
    } else if body.starts_with(b"II*\0") || body.starts_with(b"MM\0*") {
        Some(ImageKind::Tiff)
    } else {
        None
    }
}

/// Accept an image body; turn exception reports and other content into errors.
pub fn expect_image(body: &[u8]) -> ProtocolResult<ImageKind> {
    if let Some(kind) = sniff_image(body) {
        return Ok(kind);
    }
    if let Some(message) = service_exception(body) {
        return Err(ProtocolError::ServiceException(message));
    }
    let preview: String = String::from_utf8_lossy(&body[..body.len().min(64)])
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    Err(ProtocolError::NotAnImage(if preview.is_empty() {
        format!("{} bytes", body.len())
    } else {
        format!("starts with '{}'", preview)
    }))
}

/// Text of a `ServiceException` (WMS) or `ExceptionText` (OWS) report, if
/// the body is one.
pub fn service_exception(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?;
    if !text.trim_start().starts_with('<') {
        return None;
    }

    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut messages = Vec::new();
    let mut depth_in_exception = 0usize;
    let mut is_report = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == b"ServiceExceptionReport" || name == b"ExceptionReport" {
                    is_report = true;
                }
                if name == b"ServiceException" || name == b"ExceptionText" {
                    is_report = true;
                    depth_in_exception += 1;
                    if let Some(code) = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"code")
                    {
                        if let Ok(code) = code.unescape_value() {
                            messages.push(format!("[{}]", code));
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"ServiceException" {
                    is_report = true;
                }
            }
            Ok(Event::Text(t)) if depth_in_exception > 0 => {
                if let Ok(t) = t.unescape() {
                    messages.push(t.into_owned());
                }
            }
            Ok(Event::CData(t)) if depth_in_exception > 0 => {
                messages.push(String::from_utf8_lossy(&t).into_owned());
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if (name == b"ServiceException" || name == b"ExceptionText") && depth_in_exception > 0 {
                    depth_in_exception -= 1;
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    if !is_report {
        return None;
    }
    let message = messages.join(" ").trim().to_string();
    Some(if message.is_empty() {
        "unspecified service exception".to_string()
    } else {
        message
    })
}
