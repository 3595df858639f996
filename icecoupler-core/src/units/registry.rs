//! Known unit symbols with their dimensions and SI conversion factors.
//!
//! All conversion factors are the multiplier that converts FROM the registered
//! unit TO SI base units (kg, m, s, K, mol). Symbols marked as prefixable also accept
//! an SI prefix, e.g. `km`, `kPa`, `MJ`.

use super::dimension::Dimension;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Information about a known unit.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    pub symbol: &'static str,
    pub dimension: Dimension,
    pub to_si_factor: f64,
    pub prefixable: bool,
}

/// SI prefixes accepted in front of prefixable symbols.
pub static SI_PREFIXES: &[(&str, f64)] = &[
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("da", 1e1),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("n", 1e-9),
];

/// Seconds per (365-day) model year.
pub const SECONDS_PER_YEAR: f64 = 365.0 * 86400.0;

pub struct UnitRegistry {
    units: HashMap<&'static str, UnitInfo>,
}

impl UnitRegistry {
    fn new() -> Self {
        let mut units = HashMap::new();
        let mut register = |symbol: &'static str, dimension, to_si_factor, prefixable| {
            units.insert(
                symbol,
                UnitInfo {
                    symbol,
                    dimension,
                    to_si_factor,
                    prefixable,
                },
            );
        };

        register("g", Dimension::MASS, 1e-3, true);
        register("t", Dimension::MASS, 1e3, false);
        register("m", Dimension::LENGTH, 1.0, true);
        register("s", Dimension::TIME, 1.0, true);
        register("min", Dimension::TIME, 60.0, false);
        register("hr", Dimension::TIME, 3600.0, false);
        register("day", Dimension::TIME, 86400.0, false);
        register("yr", Dimension::TIME, SECONDS_PER_YEAR, false);
        register("K", Dimension::TEMPERATURE, 1.0, false);
        register("mol", Dimension::AMOUNT, 1.0, true);
        // Temperature differences only; offsets are not representable as factors
        register("degC", Dimension::TEMPERATURE, 1.0, false);
        register("N", Dimension::FORCE, 1.0, true);
        register("J", Dimension::ENERGY, 1.0, true);
        register("W", Dimension::POWER, 1.0, true);
        register("Pa", Dimension::PRESSURE, 1.0, true);
        register("bar", Dimension::PRESSURE, 1e5, false);
        register("atm", Dimension::PRESSURE, 101325.0, false);

        Self { units }
    }

    /// Look up a symbol, trying SI prefixes when there is no exact match.
    ///
    /// Returns the matched unit and the combined SI factor (including the prefix).
    pub fn lookup(&self, symbol: &str) -> Option<(&UnitInfo, f64)> {
        if let Some(info) = self.units.get(symbol) {
            return Some((info, info.to_si_factor));
        }
        SI_PREFIXES.iter().find_map(|(prefix, factor)| {
            let base = symbol.strip_prefix(prefix)?;
            let info = self.units.get(base)?;
            info.prefixable.then(|| (info, factor * info.to_si_factor))
        })
    }
}

pub static UNIT_REGISTRY: LazyLock<UnitRegistry> = LazyLock::new(UnitRegistry::new);
