//! Lambert Conformal Conic with two standard parallels, on an ellipsoid.
//!
//! This is the projection behind the Lambert state plane zones. It maps a cone
//! secant to the ellipsoid along the two standard parallels onto a flat plane.
//!
//! The projection parameters include:
//! - Standard parallels: lat1 and lat2
//! - Latitude of origin (lat0) and central meridian (lon0)
//! - False easting / northing, in metres
//!
//! Formulas follow Snyder (USGS PP 1395) eqs. 15-1 to 15-11, with the
//! iterative latitude solution of eq. 7-9 for the inverse.

use parcel_common::{StatePlaneZone, US_SURVEY_FOOT_METRES};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::Ellipsoid;

/// Lambert Conformal Conic projection parameters.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    pub ellipsoid: Ellipsoid,
    /// Central meridian in degrees
    pub lon0: f64,
    /// Latitude of origin in degrees
    pub lat0: f64,
    /// First standard parallel in degrees
    pub lat1: f64,
    /// Second standard parallel in degrees
    pub lat2: f64,
    /// False easting in metres
    pub false_easting: f64,
    /// False northing in metres
    pub false_northing: f64,
    /// Cone constant
    n: f64,
    /// Snyder's F
    f: f64,
    /// Radius at the latitude of origin
    rho0: f64,
}

impl LambertConformal {
    pub fn new(
        ellipsoid: Ellipsoid,
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let e = ellipsoid.e();
        let phi1 = lat1.to_radians();
        let phi2 = lat2.to_radians();

        let m1 = m(phi1, e);
        let m2 = m(phi2, e);
        let t1 = t(phi1, e);
        let t2 = t(phi2, e);

        // Compute cone constant n
        let n = if (phi1 - phi2).abs() < 1e-10 {
            // Tangent cone (single standard parallel)
            phi1.sin()
        } else {
            (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
        };
        let f = m1 / (n * t1.powf(n));
        let rho0 = ellipsoid.a * f * t(lat0.to_radians(), e).powf(n);

        Self {
            ellipsoid,
            lon0,
            lat0,
            lat1,
            lat2,
            false_easting,
            false_northing,
            n,
            f,
            rho0,
        }
    }

    /// NAD83 (GRS80) parameters of a state plane zone.
    pub fn state_plane(zone: StatePlaneZone) -> Self {
        let (lat1, lat2, lat0, lon0, fe, fn_) = match zone {
            StatePlaneZone::CaliforniaIII => (
                38.0 + 26.0 / 60.0,
                37.0 + 4.0 / 60.0,
                36.5,
                -120.5,
                2000000.0,
                500000.0,
            ),
            StatePlaneZone::CaliforniaV => (
                35.0 + 28.0 / 60.0,
                34.0 + 2.0 / 60.0,
                33.5,
                -118.0,
                2000000.0,
                500000.0,
            ),
            StatePlaneZone::Maryland => (39.45, 38.3, 37.0 + 40.0 / 60.0, -77.0, 400000.0, 0.0),
            StatePlaneZone::NewYorkLongIsland => (
                41.0 + 2.0 / 60.0,
                40.0 + 40.0 / 60.0,
                40.0 + 10.0 / 60.0,
                -74.0,
                300000.0,
                0.0,
            ),
            StatePlaneZone::NorthCarolina => (
                36.0 + 10.0 / 60.0,
                34.0 + 20.0 / 60.0,
                33.75,
                -79.0,
                609601.22,
                0.0,
            ),
        };
        Self::new(Ellipsoid::GRS80, lat1, lat2, lat0, lon0, fe, fn_)
    }

    fn rho(&self, phi: f64) -> f64 {
        self.ellipsoid.a * self.f * t(phi, self.ellipsoid.e()).powf(self.n)
    }

    /// Longitude/latitude in degrees to easting/northing in metres.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let rho = self.rho(lat.to_radians());

        // Normalize longitude difference to [-180, 180]
        let mut dlon = lon - self.lon0;
        while dlon > 180.0 {
            dlon -= 360.0;
        }
        while dlon < -180.0 {
            dlon += 360.0;
        }
        let theta = self.n * dlon.to_radians();

        (
            self.false_easting + rho * theta.sin(),
            self.false_northing + self.rho0 - rho * theta.cos(),
        )
    }

    /// Easting/northing in metres to longitude/latitude in degrees.
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let e = self.ellipsoid.e();
        let x = easting - self.false_easting;
        let dy = self.rho0 - (northing - self.false_northing);

        let sign = self.n.signum();
        let rho = sign * (x * x + dy * dy).sqrt();
        let theta = (sign * x).atan2(sign * dy);
        let lon = self.lon0 + (theta / self.n).to_degrees();

        if rho == 0.0 {
            return (lon, 90.0 * sign);
        }

        let t_val = (rho / (self.ellipsoid.a * self.f)).powf(1.0 / self.n);
        let mut phi = FRAC_PI_2 - 2.0 * t_val.atan();
        for _ in 0..15 {
            let es = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t_val * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
            let done = (next - phi).abs() < 1e-12;
            phi = next;
            if done {
                break;
            }
        }

        (lon, phi.to_degrees())
    }

    /// Point scale factor at a latitude.
    pub fn scale_factor(&self, lat: f64) -> f64 {
        let phi = lat.to_radians();
        self.rho(phi) * self.n / (self.ellipsoid.a * m(phi, self.ellipsoid.e()))
    }
}

/// Metres to US survey feet.
pub fn metres_to_us_feet(v: f64) -> f64 {
    v / US_SURVEY_FOOT_METRES
}

/// US survey feet to metres.
pub fn us_feet_to_metres(v: f64) -> f64 {
    v * US_SURVEY_FOOT_METRES
}

fn m(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    phi.cos() / (1.0 - es * es).sqrt()
}

fn t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: [StatePlaneZone; 5] = [
        StatePlaneZone::CaliforniaIII,
        StatePlaneZone::CaliforniaV,
        StatePlaneZone::Maryland,
        StatePlaneZone::NewYorkLongIsland,
        StatePlaneZone::NorthCarolina,
    ];

    #[test]
    fn test_origin_maps_to_false_origin() {
        for zone in ZONES {
            let proj = LambertConformal::state_plane(zone);
            let (x, y) = proj.forward(proj.lon0, proj.lat0);
            assert!((x - proj.false_easting).abs() < 1e-6, "{:?}", zone);
            assert!((y - proj.false_northing).abs() < 1e-6, "{:?}", zone);
        }
    }

    #[test]
    fn test_north_carolina_false_easting_in_feet() {
        let proj = LambertConformal::state_plane(StatePlaneZone::NorthCarolina);
        assert!((metres_to_us_feet(proj.false_easting) - 2_000_000.0).abs() < 0.01);
    }

    #[test]
    fn test_scale_is_one_on_standard_parallels() {
        for zone in ZONES {
            let proj = LambertConformal::state_plane(zone);
            assert!((proj.scale_factor(proj.lat1) - 1.0).abs() < 1e-9, "{:?}", zone);
            assert!((proj.scale_factor(proj.lat2) - 1.0).abs() < 1e-9, "{:?}", zone);
            let mid = (proj.lat1 + proj.lat2) / 2.0;
            assert!(proj.scale_factor(mid) < 1.0);
        }
    }

    #[test]
    fn test_round_trip() {
        let proj = LambertConformal::state_plane(StatePlaneZone::NorthCarolina);
        for (lon, lat) in [(-78.6382, 35.7796), (-84.0, 35.0), (-75.5, 36.3)] {
            let (x, y) = proj.forward(lon, lat);
            let (lon2, lat2) = proj.inverse(x, y);
            assert!((lon - lon2).abs() < 1e-10, "lon {} vs {}", lon, lon2);
            assert!((lat - lat2).abs() < 1e-10, "lat {} vs {}", lat, lat2);
        }
    }

    #[test]
    fn test_raleigh_is_inside_zone_grid() {
        let proj = LambertConformal::state_plane(StatePlaneZone::NorthCarolina);
        let (x, y) = proj.forward(-78.6382, 35.7796);
        let (x_ft, y_ft) = (metres_to_us_feet(x), metres_to_us_feet(y));
        assert!(x_ft > 2_050_000.0 && x_ft < 2_150_000.0, "x {}", x_ft);
        assert!(y_ft > 700_000.0 && y_ft < 780_000.0, "y {}", y_ft);
    }
}
