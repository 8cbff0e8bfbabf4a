//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in a single CRS.
///
/// Coordinates are always easting/longitude on `x` and northing/latitude on `y`,
/// regardless of the CRS's declared axis order. Units follow the CRS: degrees for
/// geographic systems, metres or US survey feet for projected ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box containing every point, or `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut bbox = BoundingBox::new(x, y, x, y);
        for (x, y) in iter {
            bbox.include_point(x, y);
        }
        Some(bbox)
    }

    /// Parse a "minx,miny,maxx,maxy" string.
    pub fn from_wms_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        Ok(Self {
            min_x: parts[0]
                .trim()
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(parts[0].to_string()))?,
            min_y: parts[1]
                .trim()
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(parts[1].to_string()))?,
            max_x: parts[2]
                .trim()
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(parts[2].to_string()))?,
            max_y: parts[3]
                .trim()
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(parts[3].to_string()))?,
        })
    }

    /// Format as "minx,miny,maxx,maxy".
    pub fn to_xy_string(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// Format with latitude first ("miny,minx,maxy,maxx"), as WMS 1.3.0 expects
    /// for geographic CRSs.
    pub fn to_yx_string(&self) -> String {
        format!("{},{},{},{}", self.min_y, self.min_x, self.max_y, self.max_x)
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Centre point (x, y).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// True when all corners are finite and min <= max on both axes.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Grow the box so it includes the point.
    pub fn include_point(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Expand every side by `dx` horizontally and `dy` vertically.
    pub fn expand(&self, dx: f64, dy: f64) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x - dx,
            min_y: self.min_y - dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Grow one axis so the box has the given width/height ratio, keeping the centre.
    ///
    /// Never shrinks: the result always contains `self`.
    pub fn fit_aspect(&self, aspect: f64) -> BoundingBox {
        if !(aspect.is_finite() && aspect > 0.0) || self.height() <= 0.0 || self.width() <= 0.0 {
            return *self;
        }
        let (cx, cy) = self.center();
        let current = self.width() / self.height();
        if current < aspect {
            let half_w = self.height() * aspect / 2.0;
            BoundingBox::new(cx - half_w, self.min_y, cx + half_w, self.max_y)
        } else {
            let half_h = self.width() / aspect / 2.0;
            BoundingBox::new(self.min_x, cy - half_h, self.max_x, cy + half_h)
        }
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// True when `other` lies inside this box (edges may touch).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// True when `other` lies inside this box without touching any edge.
    pub fn strictly_contains(&self, other: &BoundingBox) -> bool {
        other.min_x > self.min_x
            && other.max_x < self.max_x
            && other.min_y > self.min_y
            && other.max_y < self.max_y
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Largest absolute corner difference between two boxes.
    pub fn max_corner_delta(&self, other: &BoundingBox) -> f64 {
        [
            (self.min_x - other.min_x).abs(),
            (self.min_y - other.min_y).abs(),
            (self.max_x - other.max_x).abs(),
            (self.max_y - other.max_y).abs(),
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid BBOX format: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),
}
