//! Unit parsing and conversion for coupled fields and physical constants.
//!
//! Contracts carry UDUNITS-style unit strings (`kg m-2 s-1`, `J kg-1`,
//! `degC`). This module parses them into a normalized form so they can be
//! compared, checked for dimensional compatibility, and converted.
//!
//! - [`dimension`]: Physical dimension exponents (M, L, T, Θ)
//! - [`registry`]: Known unit symbols and SI factors
//! - [`parser`]: Unit string parsing
//! - [`conversion`]: [`Unit`] and conversion factors

pub mod conversion;
pub mod dimension;
pub mod parser;
pub mod registry;

pub use conversion::{conversion_factor, units_equal, ConversionError, Unit};
pub use dimension::Dimension;
pub use parser::{ParseError, ParsedUnit};
pub use registry::{UnitInfo, UnitRegistry, SECONDS_PER_YEAR, UNIT_REGISTRY};
