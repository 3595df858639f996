//! Physical dimensions for unit validation.
//!
//! Dimensions are integer exponents of the base quantities that appear in the
//! coupling contracts: mass (M), length (L), time (T), temperature (Θ) and
//! amount of substance (N).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Represents the physical dimension of a quantity.
///
/// For example a surface mass flux (`kg m-2 s-1`) has dimensions M·L⁻²·T⁻¹.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Dimension {
    /// Mass exponent (M)
    pub mass: i8,
    /// Length exponent (L)
    pub length: i8,
    /// Time exponent (T)
    pub time: i8,
    /// Temperature exponent (Θ)
    pub temperature: i8,
    /// Amount of substance exponent (N)
    #[serde(default)]
    pub amount: i8,
}

impl Dimension {
    #[must_use]
    pub const fn dimensionless() -> Self {
        Self::new(0, 0, 0, 0)
    }

    #[must_use]
    pub const fn new(mass: i8, length: i8, time: i8, temperature: i8) -> Self {
        Self {
            mass,
            length,
            time,
            temperature,
            amount: 0,
        }
    }

    #[must_use]
    const fn with_amount(self, amount: i8) -> Self {
        Self { amount, ..self }
    }

    pub const MASS: Self = Self::new(1, 0, 0, 0);
    pub const LENGTH: Self = Self::new(0, 1, 0, 0);
    pub const TIME: Self = Self::new(0, 0, 1, 0);
    pub const TEMPERATURE: Self = Self::new(0, 0, 0, 1);
    pub const AMOUNT: Self = Self::dimensionless().with_amount(1);

    /// Force (M·L·T⁻²).
    pub const FORCE: Self = Self::new(1, 1, -2, 0);
    /// Energy (M·L²·T⁻²).
    pub const ENERGY: Self = Self::new(1, 2, -2, 0);
    /// Power (M·L²·T⁻³).
    pub const POWER: Self = Self::new(1, 2, -3, 0);
    /// Pressure (M·L⁻¹·T⁻²).
    pub const PRESSURE: Self = Self::new(1, -1, -2, 0);

    #[must_use]
    pub fn is_dimensionless(&self) -> bool {
        *self == Self::dimensionless()
    }

    /// Raises the dimension to an integer power.
    #[must_use]
    pub fn pow(&self, exp: i8) -> Self {
        Self::new(
            self.mass * exp,
            self.length * exp,
            self.time * exp,
            self.temperature * exp,
        )
        .with_amount(self.amount * exp)
    }
}

impl Add for Dimension {
    type Output = Self;

    /// Adding dimensions corresponds to multiplying quantities.
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.mass + rhs.mass,
            self.length + rhs.length,
            self.time + rhs.time,
            self.temperature + rhs.temperature,
        )
        .with_amount(self.amount + rhs.amount)
    }
}

impl Sub for Dimension {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Neg for Dimension {
    type Output = Self;

    fn neg(self) -> Self {
        self.pow(-1)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let parts: Vec<String> = [
            ("M", self.mass),
            ("L", self.length),
            ("T", self.time),
            ("Θ", self.temperature),
            ("N", self.amount),
        ]
        .iter()
        .filter(|(_, exp)| *exp != 0)
        .map(|(symbol, exp)| match exp {
            1 => symbol.to_string(),
            _ => format!("{symbol}^{exp}"),
        })
        .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_dimensions() {
        assert_eq!(
            Dimension::ENERGY - Dimension::TIME,
            Dimension::POWER,
            "J / s should be W"
        );
        assert_eq!(
            Dimension::FORCE - Dimension::LENGTH.pow(2),
            Dimension::PRESSURE
        );
        let gas_constant = Dimension::ENERGY - Dimension::AMOUNT - Dimension::TEMPERATURE;
        assert_eq!(gas_constant.to_string(), "M L^2 T^-2 Θ^-1 N^-1");
    }

    #[test]
    fn test_display() {
        assert_eq!(Dimension::dimensionless().to_string(), "1");
        assert_eq!(Dimension::POWER.to_string(), "M L^2 T^-3");
    }
}
