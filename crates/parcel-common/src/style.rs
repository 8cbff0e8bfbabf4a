//! Styling attributes for layer overlays and the parcel highlight.

use serde::{Deserialize, Serialize};

/// Color representation supporting multiple formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    /// Hex string: "#RRGGBB" or "#RRGGBBAA", or a named color
    Hex(String),

    /// RGB array: [r, g, b] or [r, g, b, a]
    Array(Vec<u8>),

    /// Explicit RGBA
    Rgba { r: u8, g: u8, b: u8, a: u8 },
}

impl Color {
    pub fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color::Rgba { r, g, b, a }
    }

    pub fn transparent() -> Self {
        Color::rgba(0, 0, 0, 0)
    }

    /// Convert to RGBA tuple.
    pub fn to_rgba(&self) -> (u8, u8, u8, u8) {
        match self {
            Color::Hex(s) if s.starts_with('#') => parse_hex_color(s),
            Color::Hex(s) => named_color(s),
            Color::Array(arr) => {
                let r = arr.first().copied().unwrap_or(0);
                let g = arr.get(1).copied().unwrap_or(0);
                let b = arr.get(2).copied().unwrap_or(0);
                let a = arr.get(3).copied().unwrap_or(255);
                (r, g, b, a)
            }
            Color::Rgba { r, g, b, a } => (*r, *g, *b, *a),
        }
    }

    /// RGBA with the alpha channel multiplied by `opacity` (0.0–1.0).
    pub fn with_opacity(&self, opacity: f32) -> (u8, u8, u8, u8) {
        let (r, g, b, a) = self.to_rgba();
        let alpha = (a as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
        (r, g, b, alpha)
    }

    /// True when the string form is a recognizable color.
    pub fn is_valid(&self) -> bool {
        match self {
            Color::Hex(s) if s.starts_with('#') => {
                let hex = s.trim_start_matches('#');
                matches!(hex.len(), 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
            }
            Color::Hex(s) => named_color_opt(s).is_some(),
            Color::Array(arr) => matches!(arr.len(), 3 | 4),
            Color::Rgba { .. } => true,
        }
    }
}

fn parse_hex_color(s: &str) -> (u8, u8, u8, u8) {
    let s = s.trim_start_matches('#');
    let len = s.len();

    if len == 6 {
        let r = u8::from_str_radix(&s[0..2], 16).unwrap_or(0);
        let g = u8::from_str_radix(&s[2..4], 16).unwrap_or(0);
        let b = u8::from_str_radix(&s[4..6], 16).unwrap_or(0);
        (r, g, b, 255)
    } else if len == 8 {
        let r = u8::from_str_radix(&s[0..2], 16).unwrap_or(0);
        let g = u8::from_str_radix(&s[2..4], 16).unwrap_or(0);
        let b = u8::from_str_radix(&s[4..6], 16).unwrap_or(0);
        let a = u8::from_str_radix(&s[6..8], 16).unwrap_or(255);
        (r, g, b, a)
    } else {
        (0, 0, 0, 255)
    }
}

fn named_color_opt(name: &str) -> Option<(u8, u8, u8, u8)> {
    let rgba = match name.to_lowercase().as_str() {
        "transparent" | "none" => (0, 0, 0, 0),
        "black" => (0, 0, 0, 255),
        "white" => (255, 255, 255, 255),
        "red" => (255, 0, 0, 255),
        "green" => (0, 128, 0, 255),
        "blue" => (0, 0, 255, 255),
        "yellow" => (255, 255, 0, 255),
        "cyan" => (0, 255, 255, 255),
        "magenta" => (255, 0, 255, 255),
        "orange" => (255, 165, 0, 255),
        "purple" => (128, 0, 128, 255),
        "brown" => (139, 69, 19, 255),
        "gray" | "grey" => (128, 128, 128, 255),
        _ => return None,
    };
    Some(rgba)
}

fn named_color(name: &str) -> (u8, u8, u8, u8) {
    named_color_opt(name).unwrap_or((0, 0, 0, 255))
}

/// Per-layer drawing style from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    /// Polygon fill color
    #[serde(default = "default_fill_color")]
    pub fill_color: Color,

    /// Fill opacity (0.0–1.0), applied on top of the fill color's own alpha
    #[serde(default = "default_fill_opacity")]
    pub fill_opacity: f32,

    /// Outline / line color
    #[serde(default = "default_line_color")]
    pub line_color: Color,

    /// Line width in pixels at 96 dpi
    #[serde(default = "default_line_width")]
    pub line_width: f32,

    /// Overall layer opacity; the alpha for raster overlays
    #[serde(default = "default_opacity")]
    pub opacity: f32,

    /// Point marker radius in pixels at 96 dpi
    #[serde(default = "default_point_radius")]
    pub point_radius: f32,
}

fn default_fill_color() -> Color {
    Color::Hex("#4c78a8".to_string())
}

fn default_fill_opacity() -> f32 {
    0.4
}

fn default_line_color() -> Color {
    Color::Hex("#294162".to_string())
}

fn default_line_width() -> f32 {
    0.8
}

fn default_opacity() -> f32 {
    1.0
}

fn default_point_radius() -> f32 {
    3.0
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            fill_color: default_fill_color(),
            fill_opacity: default_fill_opacity(),
            line_color: default_line_color(),
            line_width: default_line_width(),
            opacity: default_opacity(),
            point_radius: default_point_radius(),
        }
    }
}

impl LayerStyle {
    pub fn validate(&self) -> Result<(), String> {
        if !self.fill_color.is_valid() {
            return Err(format!("invalid fill_color {:?}", self.fill_color));
        }
        if !self.line_color.is_valid() {
            return Err(format!("invalid line_color {:?}", self.line_color));
        }
        for (name, value) in [("fill_opacity", self.fill_opacity), ("opacity", self.opacity)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be within 0..1, got {}", name, value));
            }
        }
        if !(self.line_width >= 0.0 && self.line_width.is_finite()) {
            return Err(format!("line_width must be non-negative, got {}", self.line_width));
        }
        Ok(())
    }
}

/// Fixed highlight drawn around the subject parcel on every image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParcelHighlight {
    pub fill: (u8, u8, u8),
    pub fill_alpha: f32,
    pub outline: (u8, u8, u8),
    /// Outline width in pixels at 96 dpi
    pub outline_width: f32,
}

impl ParcelHighlight {
    pub const DEFAULT: ParcelHighlight = ParcelHighlight {
        fill: (0x00, 0xff, 0xff),
        fill_alpha: 0.18,
        outline: (0x00, 0xb7, 0xc2),
        outline_width: 2.5,
    };
}
