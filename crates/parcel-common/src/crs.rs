//! Coordinate Reference System identifiers and units.

use serde::{Deserialize, Serialize};
use std::fmt;

/// International foot in metres.
pub const FOOT_METRES: f64 = 0.3048;

/// US survey foot in metres (1200/3937).
pub const US_SURVEY_FOOT_METRES: f64 = 1200.0 / 3937.0;

/// Datum family of a UTM zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtmDatum {
    Wgs84,
    Nad83,
}

/// NAD83 state plane zones (Lambert Conformal Conic, US survey feet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatePlaneZone {
    /// EPSG:2227
    CaliforniaIII,
    /// EPSG:2229
    CaliforniaV,
    /// EPSG:2248
    Maryland,
    /// EPSG:2263
    NewYorkLongIsland,
    /// EPSG:2264
    NorthCarolina,
}

impl StatePlaneZone {
    pub fn epsg(&self) -> u32 {
        match self {
            StatePlaneZone::CaliforniaIII => 2227,
            StatePlaneZone::CaliforniaV => 2229,
            StatePlaneZone::Maryland => 2248,
            StatePlaneZone::NewYorkLongIsland => 2263,
            StatePlaneZone::NorthCarolina => 2264,
        }
    }

    fn from_epsg(code: u32) -> Option<Self> {
        match code {
            2227 => Some(StatePlaneZone::CaliforniaIII),
            2229 => Some(StatePlaneZone::CaliforniaV),
            2248 => Some(StatePlaneZone::Maryland),
            2263 => Some(StatePlaneZone::NewYorkLongIsland),
            2264 => Some(StatePlaneZone::NorthCarolina),
            _ => None,
        }
    }
}

/// Supported coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CrsCode {
    /// WGS84 geographic (EPSG:4326, CRS:84)
    Wgs84,
    /// NAD83 geographic (EPSG:4269)
    Nad83,
    /// Spherical Web Mercator (EPSG:3857)
    WebMercator,
    /// Universal Transverse Mercator, metres
    Utm {
        zone: u8,
        north: bool,
        datum: UtmDatum,
    },
    /// State plane, US survey feet
    StatePlane(StatePlaneZone),
}

/// Linear unit of a CRS's coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearUnit {
    Degree,
    Metre,
    UsSurveyFoot,
}

impl LinearUnit {
    /// Convert a distance in international feet into this unit.
    ///
    /// Returns `None` for angular units; a degree has no fixed ground length.
    pub fn from_feet(&self, feet: f64) -> Option<f64> {
        match self {
            LinearUnit::Degree => None,
            LinearUnit::Metre => Some(feet * FOOT_METRES),
            LinearUnit::UsSurveyFoot => Some(feet * FOOT_METRES / US_SURVEY_FOOT_METRES),
        }
    }

    /// Metres per unit, `None` for angular units.
    pub fn metres(&self) -> Option<f64> {
        match self {
            LinearUnit::Degree => None,
            LinearUnit::Metre => Some(1.0),
            LinearUnit::UsSurveyFoot => Some(US_SURVEY_FOOT_METRES),
        }
    }
}

impl CrsCode {
    /// Parse a CRS identifier.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326" / "epsg:4326"
    /// - "CRS:84" (WGS84 with lon/lat order)
    /// - "EPSG:3857", "EPSG:900913", "EPSG:102100"
    /// - "EPSG:32617" (UTM), "EPSG:26917" (NAD83 UTM)
    /// - "EPSG:2264" (state plane)
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        if normalized == "CRS:84" || normalized == "OGC:CRS84" {
            return Ok(CrsCode::Wgs84);
        }

        let code = normalized
            .strip_prefix("EPSG:")
            .unwrap_or(&normalized)
            .parse::<u32>()
            .map_err(|_| CrsParseError::UnsupportedCrs(s.to_string()))?;

        Self::from_epsg(code).ok_or_else(|| CrsParseError::UnsupportedCrs(s.to_string()))
    }

    /// Resolve a numeric EPSG code (or ArcGIS WKID).
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(CrsCode::Wgs84),
            4269 => Some(CrsCode::Nad83),
            3857 | 900913 | 102100 => Some(CrsCode::WebMercator),
            32601..=32660 => Some(CrsCode::Utm {
                zone: (code - 32600) as u8,
                north: true,
                datum: UtmDatum::Wgs84,
            }),
            32701..=32760 => Some(CrsCode::Utm {
                zone: (code - 32700) as u8,
                north: false,
                datum: UtmDatum::Wgs84,
            }),
            26901..=26923 => Some(CrsCode::Utm {
                zone: (code - 26900) as u8,
                north: true,
                datum: UtmDatum::Nad83,
            }),
            _ => StatePlaneZone::from_epsg(code).map(CrsCode::StatePlane),
        }
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Wgs84 => 4326,
            CrsCode::Nad83 => 4269,
            CrsCode::WebMercator => 3857,
            CrsCode::Utm {
                zone,
                north: true,
                datum: UtmDatum::Wgs84,
            } => 32600 + *zone as u32,
            CrsCode::Utm {
                zone,
                north: false,
                datum: UtmDatum::Wgs84,
            } => 32700 + *zone as u32,
            CrsCode::Utm {
                zone,
                datum: UtmDatum::Nad83,
                ..
            } => 26900 + *zone as u32,
            CrsCode::StatePlane(zone) => zone.epsg(),
        }
    }

    /// WGS84 UTM zone containing a longitude/latitude.
    pub fn utm_for(lon: f64, lat: f64) -> Self {
        let zone = (((lon + 180.0) / 6.0).floor() as i32).clamp(0, 59) + 1;
        CrsCode::Utm {
            zone: zone as u8,
            north: lat >= 0.0,
            datum: UtmDatum::Wgs84,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Wgs84 | CrsCode::Nad83)
    }

    /// Unit of the coordinate axes.
    pub fn linear_unit(&self) -> LinearUnit {
        match self {
            CrsCode::Wgs84 | CrsCode::Nad83 => LinearUnit::Degree,
            CrsCode::WebMercator | CrsCode::Utm { .. } => LinearUnit::Metre,
            CrsCode::StatePlane(_) => LinearUnit::UsSurveyFoot,
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl TryFrom<String> for CrsCode {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CrsCode::parse(&value)
    }
}

impl From<CrsCode> for String {
    fn from(value: CrsCode) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for CrsCode {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrsCode::parse(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(CrsCode::parse("EPSG:4326").unwrap(), CrsCode::Wgs84);
        assert_eq!(CrsCode::parse("epsg:3857").unwrap(), CrsCode::WebMercator);
        assert_eq!(CrsCode::parse("CRS:84").unwrap(), CrsCode::Wgs84);
        assert_eq!(CrsCode::parse("102100").unwrap(), CrsCode::WebMercator);
        assert_eq!(
            CrsCode::parse("EPSG:2264").unwrap(),
            CrsCode::StatePlane(StatePlaneZone::NorthCarolina)
        );
        assert!(CrsCode::parse("EPSG:99999").is_err());
        assert!(CrsCode::parse("not-a-crs").is_err());
    }

    #[test]
    fn test_utm_codes_round_trip() {
        let north = CrsCode::parse("EPSG:32617").unwrap();
        assert_eq!(
            north,
            CrsCode::Utm {
                zone: 17,
                north: true,
                datum: UtmDatum::Wgs84
            }
        );
        assert_eq!(north.epsg(), 32617);
        assert_eq!(CrsCode::parse("EPSG:32755").unwrap().epsg(), 32755);
        assert_eq!(CrsCode::parse("EPSG:26918").unwrap().epsg(), 26918);
    }

    #[test]
    fn test_utm_for_lon_lat() {
        assert_eq!(CrsCode::utm_for(-80.0, 35.0).epsg(), 32617);
        assert_eq!(CrsCode::utm_for(151.2, -33.9).epsg(), 32756);
        assert_eq!(CrsCode::utm_for(180.0, 10.0).epsg(), 32660);
    }

    #[test]
    fn test_feet_conversion() {
        assert!((LinearUnit::Metre.from_feet(100.0).unwrap() - 30.48).abs() < 1e-9);
        let us_ft = LinearUnit::UsSurveyFoot.from_feet(100.0).unwrap();
        assert!((us_ft - 99.999_8).abs() < 1e-3);
        assert!(LinearUnit::Degree.from_feet(100.0).is_none());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&CrsCode::WebMercator).unwrap();
        assert_eq!(json, "\"EPSG:3857\"");
        let parsed: CrsCode = serde_json::from_str("\"EPSG:4269\"").unwrap();
        assert_eq!(parsed, CrsCode::Nad83);
        assert!(serde_json::from_str::<CrsCode>("\"EPSG:1\"").is_err());
    }
}
