//! Transverse Mercator on an ellipsoid (UTM zones).
//!
//! Uses the series expansions from Snyder, "Map Projections: A Working Manual"
//! (USGS PP 1395), eqs. 8-9 to 8-11 and 8-17 to 8-25. Good to about a
//! millimetre within a zone's 6° width.

use crate::Ellipsoid;

const UTM_SCALE: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10000000.0;

#[derive(Debug, Clone, Copy)]
pub struct TransverseMercator {
    pub ellipsoid: Ellipsoid,
    /// Central meridian in degrees
    pub lon0: f64,
    /// Scale on the central meridian
    pub k0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

impl TransverseMercator {
    /// Projection for a UTM zone (1–60).
    pub fn utm(zone: u8, north: bool, ellipsoid: Ellipsoid) -> Self {
        Self {
            ellipsoid,
            lon0: (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0,
            k0: UTM_SCALE,
            false_easting: UTM_FALSE_EASTING,
            false_northing: if north { 0.0 } else { UTM_FALSE_NORTHING_SOUTH },
        }
    }

    /// Meridian arc length from the equator to `phi` (radians).
    fn meridian_arc(&self, phi: f64) -> f64 {
        let e2 = self.ellipsoid.e2();
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        self.ellipsoid.a
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
    }

    /// Longitude/latitude in degrees to easting/northing in metres.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let a = self.ellipsoid.a;
        let e2 = self.ellipsoid.e2();
        let ep2 = self.ellipsoid.ep2();

        let phi = lat.to_radians();
        let dlon = normalize_degrees(lon - self.lon0).to_radians();

        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let aa = dlon * cos_phi;
        let m = self.meridian_arc(phi);

        let aa2 = aa * aa;
        let aa3 = aa2 * aa;
        let aa4 = aa3 * aa;
        let aa5 = aa4 * aa;
        let aa6 = aa5 * aa;

        let x = self.k0
            * n
            * (aa + (1.0 - t + c) * aa3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * aa5 / 120.0);
        let y = self.k0
            * (m + n
                * tan_phi
                * (aa2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * aa4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * aa6 / 720.0));

        (x + self.false_easting, y + self.false_northing)
    }

    /// Easting/northing in metres to longitude/latitude in degrees.
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let a = self.ellipsoid.a;
        let e2 = self.ellipsoid.e2();
        let ep2 = self.ellipsoid.ep2();

        let x = easting - self.false_easting;
        let m = (northing - self.false_northing) / self.k0;

        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let sqrt_1me2 = (1.0 - e2).sqrt();
        let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin_phi1, cos_phi1) = phi1.sin_cos();
        let tan_phi1 = phi1.tan();
        let c1 = ep2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let w = 1.0 - e2 * sin_phi1 * sin_phi1;
        let n1 = a / w.sqrt();
        let r1 = a * (1.0 - e2) / w.powf(1.5);
        let d = x / (n1 * self.k0);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let phi = phi1
            - (n1 * tan_phi1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                        * d6
                        / 720.0);
        let dlon = (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi1;

        (
            normalize_degrees(self.lon0 + dlon.to_degrees()),
            phi.to_degrees(),
        )
    }

    /// Point scale factor at a longitude/latitude.
    pub fn scale_factor(&self, lon: f64, lat: f64) -> f64 {
        let ep2 = self.ellipsoid.ep2();
        let phi = lat.to_radians();
        let cos_phi = phi.cos();
        let t = phi.tan().powi(2);
        let c = ep2 * cos_phi * cos_phi;
        let aa = normalize_degrees(lon - self.lon0).to_radians() * cos_phi;
        let aa2 = aa * aa;
        self.k0
            * (1.0
                + (1.0 + c) * aa2 / 2.0
                + (5.0 - 4.0 * t + 42.0 * c + 13.0 * c * c - 28.0 * ep2) * aa2 * aa2 / 24.0
                + (61.0 - 148.0 * t + 16.0 * t * t) * aa2 * aa2 * aa2 / 720.0)
    }
}

/// Wrap a longitude difference into [-180, 180).
fn normalize_degrees(mut deg: f64) -> f64 {
    while deg >= 180.0 {
        deg -= 360.0;
    }
    while deg < -180.0 {
        deg += 360.0;
    }
    deg
}
