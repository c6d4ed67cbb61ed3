//! Physical and unit-conversion constants used by the transport models.

/// Speed of light in vacuum, in m/s.
pub const SPEED_OF_LIGHT: f64 = 2.99792458e8;

/// Conversion factor from meters to millimeters, the internal transverse unit.
pub const M_TO_MM: f64 = 1.0e3;
