//! The [`Unit`] type used by contracts and the constant set.
//!
//! ```
//! use icecoupler_core::units::Unit;
//!
//! let flux = Unit::parse("kg m-2 s-1").unwrap();
//! let per_year = Unit::parse("kg/m^2/yr").unwrap();
//! assert!(flux.is_compatible(&per_year));
//! let factor = per_year.conversion_factor(&flux).unwrap();
//! assert!((factor * 365.0 * 86400.0 - 1.0).abs() < 1e-12);
//! ```

use super::dimension::Dimension;
use super::parser::{ParseError, ParsedUnit};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error(
        "cannot convert from '{from_unit}' to '{to_unit}': incompatible dimensions ({from} vs {to})"
    )]
    IncompatibleDimensions {
        from: Dimension,
        to: Dimension,
        from_unit: String,
        to_unit: String,
    },
    #[error("unit parse error: {0}")]
    ParseError(#[from] ParseError),
}

/// A parsed unit which remembers how it was written.
///
/// Equality ignores the original spelling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    original: String,
    parsed: ParsedUnit,
}

impl Unit {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let parsed = ParsedUnit::parse(input)?;
        Ok(Self {
            original: input.to_string(),
            parsed,
        })
    }

    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    #[must_use]
    pub fn is_dimensionless(&self) -> bool {
        self.dimension().is_dimensionless()
    }

    pub fn dimension(&self) -> Dimension {
        self.parsed.dimension()
    }

    pub fn to_si_factor(&self) -> f64 {
        self.parsed.to_si_factor()
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.dimension() == other.dimension()
    }

    /// Multiplier converting a value in `self` into `other`.
    pub fn conversion_factor(&self, other: &Self) -> Result<f64, ConversionError> {
        if !self.is_compatible(other) {
            return Err(ConversionError::IncompatibleDimensions {
                from: self.dimension(),
                to: other.dimension(),
                from_unit: self.original.clone(),
                to_unit: other.original.clone(),
            });
        }
        Ok(self.to_si_factor() / other.to_si_factor())
    }

    pub fn convert_to(&self, value: f64, other: &Self) -> Result<f64, ConversionError> {
        Ok(value * self.conversion_factor(other)?)
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.parsed == other.parsed
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Conversion factor between two unit strings.
pub fn conversion_factor(from: &str, to: &str) -> Result<f64, ConversionError> {
    Unit::parse(from)?.conversion_factor(&Unit::parse(to)?)
}

/// Whether two unit strings describe the same unit.
///
/// Unparseable strings fall back to literal comparison.
pub fn units_equal(a: &str, b: &str) -> bool {
    match (Unit::parse(a), Unit::parse(b)) {
        (Ok(ua), Ok(ub)) => ua == ub,
        _ => a.trim() == b.trim(),
    }
}
