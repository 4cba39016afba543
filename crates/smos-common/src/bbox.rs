//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in decimal degrees.
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

    /// The whole globe.
    pub fn global() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Parse a comma separated "x1,y1,x2,y2" string.
    pub fn from_csv(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }
        Self::from_array(values)
    }

    /// Build from an `[x1, y1, x2, y2]` array, validating the result.
    pub fn from_array(values: [f64; 4]) -> Result<Self, BboxParseError> {
        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// Reject non-finite coordinates and inverted corners.
    pub fn validate(&self) -> Result<(), BboxParseError> {
        if !self.to_array().iter().all(|v| v.is_finite()) {
            return Err(BboxParseError::NotFinite(self.to_string()));
        }
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(BboxParseError::Inverted(self.to_string()));
        }
        Ok(())
    }

    /// Width of the bounding box in degrees.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in degrees.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// True if this bbox covers `other` up to a tolerance `eps` on every side.
    pub fn covers(&self, other: &BoundingBox, eps: f64) -> bool {
        self.min_x < other.min_x + eps
            && self.max_x > other.max_x - eps
            && self.min_y < other.min_y + eps
            && self.max_y > other.max_y - eps
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bbox format: {0}. Expected 'x1,y1,x2,y2'")]
    InvalidFormat(String),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),

    #[error("Bbox coordinates must be finite: {0}")]
    NotFinite(String),

    #[error("Bbox minimum exceeds maximum: {0}")]
    Inverted(String),
}

impl From<BboxParseError> for crate::SmosError {
    fn from(err: BboxParseError) -> Self {
        crate::SmosError::InvalidBbox(err.to_string())
    }
}
