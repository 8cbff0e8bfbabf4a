//! Spherical Web Mercator (EPSG:3857).

use parcel_common::tile::MAX_MERCATOR_LAT;

/// Sphere radius used by Web Mercator.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Longitude/latitude in degrees to metres. Latitude is clamped to the
/// square's limit so polar inputs stay finite.
pub fn forward(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();
    (x, y)
}

/// Metres to longitude/latitude in degrees.
pub fn inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

/// Point scale factor (sec φ).
pub fn scale_factor(lat: f64) -> f64 {
    1.0 / lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians().cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        let (x, y) = forward(180.0, 0.0);
        assert!((x - 20037508.342789244).abs() < 1e-6);
        assert!(y.abs() < 1e-9);

        let (x, y) = forward(-78.6382, 35.7796);
        let (lon, lat) = inverse(x, y);
        assert!((lon + 78.6382).abs() < 1e-10);
        assert!((lat - 35.7796).abs() < 1e-10);
    }

    #[test]
    fn test_scale_factor() {
        assert!((scale_factor(0.0) - 1.0).abs() < 1e-12);
        assert!((scale_factor(60.0) - 2.0).abs() < 1e-9);
    }
}
