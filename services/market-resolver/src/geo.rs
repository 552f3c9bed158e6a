//! Great-circle distance
//!
//! Stateless; safe to call from any thread.

use types::errors::CoordinateError;
use types::location::Coordinate;

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Reject non-finite or out-of-range coordinates.
pub fn validate(coordinate: Coordinate) -> Result<Coordinate, CoordinateError> {
    if coordinate.is_valid() {
        Ok(coordinate)
    } else {
        Err(CoordinateError::InvalidCoordinate {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        })
    }
}

/// Haversine distance between `a` and `b` in miles.
pub fn haversine_miles(a: Coordinate, b: Coordinate) -> Result<f64, CoordinateError> {
    let a = validate(a)?;
    let b = validate(b)?;

    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    // sin² is even, so taking |Δ| keeps the result exactly symmetric.
    let half_dphi = ((b.latitude - a.latitude).abs().to_radians() / 2.0).sin();
    let half_dlambda = ((b.longitude - a.longitude).abs().to_radians() / 2.0).sin();

    let h = half_dphi * half_dphi + phi1.cos() * phi2.cos() * half_dlambda * half_dlambda;
    Ok(2.0 * EARTH_RADIUS_MILES * h.sqrt().min(1.0).asin())
}

/// Whether `b` lies within `radius_miles` of `a` (inclusive).
pub fn within_radius(a: Coordinate, b: Coordinate, radius_miles: f64) -> Result<bool, CoordinateError> {
    Ok(haversine_miles(a, b)? <= radius_miles)
}
