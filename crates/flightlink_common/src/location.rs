use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// Accepted latitude range in degrees.
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);

/// Accepted longitude range in degrees.
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// A geographic position, as shown on a map.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Location {
    /// Degrees north of the equator
    pub latitude: f64,
    /// Degrees east of Greenwich
    pub longitude: f64,
}

impl Location {
    /// Creates a location without validating it.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Checks that `value` lies inside the inclusive `range`.
pub fn check_range(field: &'static str, value: f64, range: (f64, f64)) -> Result<f64, LinkError> {
    let (min, max) = range;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(LinkError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Validates a latitude sample.
pub fn validate_latitude(value: f64) -> Result<f64, LinkError> {
    check_range("latitude", value, LATITUDE_RANGE)
}

/// Validates a longitude sample.
pub fn validate_longitude(value: f64) -> Result<f64, LinkError> {
    check_range("longitude", value, LONGITUDE_RANGE)
}
