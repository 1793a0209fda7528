//! WGS84 coordinate validation

use crate::error::ValidationError;

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Latitude within [-90, 90]. NaN is never valid.
#[inline]
pub fn is_valid_latitude(latitude: f64) -> bool {
    (MIN_LAT..=MAX_LAT).contains(&latitude)
}

/// Longitude within [-180, 180]. NaN is never valid.
#[inline]
pub fn is_valid_longitude(longitude: f64) -> bool {
    (MIN_LON..=MAX_LON).contains(&longitude)
}

#[inline]
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    is_valid_latitude(latitude) && is_valid_longitude(longitude)
}

/// Fail with the first violated bound
pub fn require_valid(latitude: f64, longitude: f64) -> Result<(), ValidationError> {
    if !is_valid_latitude(latitude) {
        return Err(ValidationError::Latitude(latitude));
    }
    if !is_valid_longitude(longitude) {
        return Err(ValidationError::Longitude(longitude));
    }

    Ok(())
}

/// Exactly (0, 0): a receiver default, not a fix in the Gulf of Guinea
#[inline]
pub fn is_null_island(latitude: f64, longitude: f64) -> bool {
    latitude == 0.0 && longitude == 0.0
}
