//! Unit string parser.
//!
//! Accepts the UDUNITS-style strings used in coupling contracts as well as a
//! few common variations:
//!
//! - Exponents: `m-2`, `m2`, `m^2`, `m^-2`, `m**2`
//! - Multiplication: `kg m`, `kg*m`, `kg·m`
//! - Division: `W/m^2`, `kg/m2/s` (each `/` applies to the following group)
//! - Whitespace around `^` is ignored: `W / m ^ 2`
//!
//! # Grammar
//!
//! ```text
//! unit_expr  = group ('/' group)*
//! group      = factor ((' ' | '*' | '·') factor)*
//! factor     = symbol ('^')? exponent? | '1'
//! symbol     = [a-zA-Z_]+
//! exponent   = ('-' | '+')? [0-9]+
//! ```

use super::dimension::Dimension;
use super::registry::UNIT_REGISTRY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty unit string")]
    EmptyUnit,
    #[error("unknown unit: '{0}'")]
    UnknownUnit(String),
    #[error("invalid exponent: '{0}'")]
    InvalidExponent(String),
    #[error("unexpected character: '{0}'")]
    UnexpectedChar(char),
}

/// A unit as a product of symbols raised to integer powers.
///
/// `W m-2` is stored as `{W: 1, m: -2}`. Equality compares the normalised
/// components, so `W/m^2 == W m-2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUnit {
    components: BTreeMap<String, i32>,
}

impl ParsedUnit {
    #[must_use]
    pub fn dimensionless() -> Self {
        Self {
            components: BTreeMap::new(),
        }
    }

    /// Parses a unit string, checking that every symbol is known.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseError::EmptyUnit);
        }
        if input == "1" || input.eq_ignore_ascii_case("dimensionless") {
            return Ok(Self::dimensionless());
        }

        let normalised = normalise(input);
        let mut components: BTreeMap<String, i32> = BTreeMap::new();
        for (group_ix, group) in normalised.split('/').enumerate() {
            let sign = if group_ix == 0 { 1 } else { -1 };
            let factors = group
                .split(|c: char| c.is_whitespace() || c == '*' || c == '·')
                .filter(|f| !f.is_empty());
            for factor in factors {
                if let Some((symbol, exp)) = parse_factor(factor)? {
                    if UNIT_REGISTRY.lookup(&symbol).is_none() {
                        return Err(ParseError::UnknownUnit(symbol));
                    }
                    *components.entry(symbol).or_insert(0) += sign * exp;
                }
            }
        }
        components.retain(|_, exp| *exp != 0);
        Ok(Self { components })
    }

    pub fn components(&self) -> &BTreeMap<String, i32> {
        &self.components
    }

    /// Overall physical dimension
    pub fn dimension(&self) -> Dimension {
        self.components
            .iter()
            .filter_map(|(symbol, &exp)| {
                UNIT_REGISTRY
                    .lookup(symbol)
                    .map(|(info, _)| info.dimension.pow(exp as i8))
            })
            .fold(Dimension::dimensionless(), |acc, d| acc + d)
    }

    /// Multiplier converting a value in this unit to SI base units
    pub fn to_si_factor(&self) -> f64 {
        self.components
            .iter()
            .filter_map(|(symbol, &exp)| {
                UNIT_REGISTRY
                    .lookup(symbol)
                    .map(|(_, factor)| factor.powi(exp))
            })
            .product()
    }
}

impl fmt::Display for ParsedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "1");
        }
        // Positive exponents first, UDUNITS style
        let mut parts: Vec<(&String, &i32)> = self.components.iter().collect();
        parts.sort_by_key(|(_, exp)| **exp < 0);
        let rendered: Vec<String> = parts
            .iter()
            .map(|(symbol, exp)| match exp {
                1 => symbol.to_string(),
                _ => format!("{symbol}{exp}"),
            })
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

/// Collapse `**` to `^` and drop whitespace next to `^`.
fn normalise(input: &str) -> String {
    let replaced = input.replace("**", "^");
    let mut out = String::with_capacity(replaced.len());
    let mut chars = replaced.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '^' {
            while out.ends_with(' ') {
                out.pop();
            }
            out.push('^');
            while chars.peek() == Some(&' ') {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split `m-2` / `m^2` / `s` into symbol and exponent.
///
/// Returns `None` for a bare `1`, which contributes nothing.
fn parse_factor(factor: &str) -> Result<Option<(String, i32)>, ParseError> {
    let split = factor
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '_'))
        .unwrap_or(factor.len());
    let (symbol, rest) = factor.split_at(split);

    if symbol.is_empty() {
        return match rest {
            "1" => Ok(None),
            _ => Err(rest
                .chars()
                .next()
                .map(ParseError::UnexpectedChar)
                .unwrap_or(ParseError::EmptyUnit)),
        };
    }

    let exponent = rest.strip_prefix('^').unwrap_or(rest);
    if exponent.is_empty() {
        return Ok(Some((symbol.to_string(), 1)));
    }
    let exp: i32 = exponent
        .parse()
        .map_err(|_| ParseError::InvalidExponent(exponent.to_string()))?;
    Ok(Some((symbol.to_string(), exp)))
}
