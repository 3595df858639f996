//! Named, unit-tagged contracts describing what crosses the GCM / ice boundary.
//!
//! A [`CouplingContract`] is an ordered list of [`CoupledField`]s. The position
//! of a field in the contract is its index in every value array exchanged
//! across the boundary, so fields are never reordered or removed once added.
//!
//! Every contract also has an implicit `"unit"` pseudo-field which always holds
//! the value 1. It is never stored, but it has an index one past the last real
//! field so that constant terms can be expressed as ordinary linear
//! coefficients (see [`crate::transformer::VarTransformer`]).

use crate::errors::{CouplingError, CouplingResult};
use crate::units::Unit;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Name of the implicit constant-1 slot of every contract
pub const UNIT: &str = "unit";

/// Grid a coupled field is defined on.
///
/// The discriminants are the values stored in the two low bits of the
/// integer flag encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldGrid {
    Atmosphere = 1,
    Ice = 2,
    Elevation = 3,
}

impl FieldGrid {
    fn label(&self) -> &'static str {
        match self {
            FieldGrid::Atmosphere => "ATMOSPHERE",
            FieldGrid::Ice => "ICE",
            FieldGrid::Elevation => "ELEVATION",
        }
    }
}

/// Flags attached to a coupled field.
///
/// Written as `|`-separated names, e.g. `"ELEVATION|INITIAL"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldFlags {
    pub grid: Option<FieldGrid>,
    /// Only meaningful before the first coupling step that runs the ice model
    pub initial: bool,
}

impl FieldFlags {
    pub const GRID_BITS: u32 = 3;
    pub const INITIAL: u32 = 4;

    pub const fn none() -> Self {
        Self {
            grid: None,
            initial: false,
        }
    }

    pub const fn on(grid: FieldGrid) -> Self {
        Self {
            grid: Some(grid),
            initial: false,
        }
    }

    pub const fn with_initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Integer encoding
    pub fn bits(&self) -> u32 {
        let grid = self.grid.map(|g| g as u32).unwrap_or(0);
        grid | if self.initial { Self::INITIAL } else { 0 }
    }

    pub fn from_bits(bits: u32) -> CouplingResult<Self> {
        if bits & !(Self::GRID_BITS | Self::INITIAL) != 0 {
            return Err(CouplingError::InvalidSpec {
                spec: bits.to_string(),
                details: "unknown flag bits".to_string(),
            });
        }
        let grid = match bits & Self::GRID_BITS {
            1 => Some(FieldGrid::Atmosphere),
            2 => Some(FieldGrid::Ice),
            3 => Some(FieldGrid::Elevation),
            _ => None,
        };
        Ok(Self {
            grid,
            initial: bits & Self::INITIAL != 0,
        })
    }
}

impl fmt::Display for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(grid) = self.grid {
            parts.push(grid.label());
        }
        if self.initial {
            parts.push("INITIAL");
        }
        write!(f, "{}", parts.join("|"))
    }
}

impl FromStr for FieldFlags {
    type Err = CouplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |details: &str| CouplingError::InvalidSpec {
            spec: s.to_string(),
            details: details.to_string(),
        };

        let mut flags = FieldFlags::none();
        for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            let grid = match part.to_ascii_uppercase().as_str() {
                "ATMOSPHERE" => FieldGrid::Atmosphere,
                "ICE" => FieldGrid::Ice,
                "ELEVATION" => FieldGrid::Elevation,
                "INITIAL" => {
                    flags.initial = true;
                    continue;
                }
                _ => return Err(invalid(&format!("unknown flag '{part}'"))),
            };
            if flags.grid.replace(grid).is_some() {
                return Err(invalid("more than one grid given"));
            }
        }
        Ok(flags)
    }
}

impl TryFrom<String> for FieldFlags {
    type Error = CouplingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldFlags> for String {
    fn from(value: FieldFlags) -> Self {
        value.to_string()
    }
}

/// A physical quantity exchanged across the coupling boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupledField {
    pub name: String,
    /// Used before the first coupling and for ice cells with no coupled value
    pub default_value: f64,
    pub units: String,
    #[serde(default)]
    pub flags: FieldFlags,
    #[serde(default)]
    pub description: String,
}

impl CoupledField {
    pub fn new(name: &str, default_value: f64, units: &str) -> Self {
        Self {
            name: name.to_string(),
            default_value,
            units: units.to_string(),
            flags: FieldFlags::none(),
            description: String::new(),
        }
    }

    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

impl fmt::Display for CoupledField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) default={} [{}]",
            self.name, self.units, self.default_value, self.flags
        )?;
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        Ok(())
    }
}

/// Ordered registry of coupled fields.
///
/// Serialized as the plain ordered list of fields; the name lookup is rebuilt
/// on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CoupledField>", into = "Vec<CoupledField>")]
pub struct CouplingContract {
    fields: Vec<CoupledField>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CouplingContract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, returning its index.
    pub fn add_field(&mut self, field: CoupledField) -> CouplingResult<usize> {
        if field.name == UNIT || self.index.contains_key(&field.name) {
            return Err(CouplingError::DuplicateField { name: field.name });
        }
        if let Err(e) = Unit::parse(&field.units) {
            warn!(
                "Field '{}' has units '{}' which cannot be parsed: {}",
                field.name, field.units, e
            );
        }

        let ix = self.fields.len();
        self.index.insert(field.name.clone(), ix);
        self.fields.push(field);
        Ok(ix)
    }

    pub fn add(
        &mut self,
        name: &str,
        default_value: f64,
        units: &str,
        flags: FieldFlags,
        description: &str,
    ) -> CouplingResult<usize> {
        self.add_field(
            CoupledField::new(name, default_value, units)
                .with_flags(flags)
                .with_description(description),
        )
    }

    /// Index of a field, `None` if absent.
    ///
    /// `"unit"` resolves to [`Self::unit_index`].
    pub fn index(&self, name: &str) -> Option<usize> {
        if name == UNIT {
            return Some(self.unit_index());
        }
        self.index.get(name).copied()
    }

    pub fn index_strict(&self, name: &str) -> CouplingResult<usize> {
        self.index(name).ok_or_else(|| CouplingError::UnknownField {
            context: "contract".to_string(),
            name: name.to_string(),
        })
    }

    pub fn field(&self, ix: usize) -> Option<&CoupledField> {
        self.fields.get(ix)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&CoupledField> {
        self.index.get(name).map(|&ix| &self.fields[ix])
    }

    /// Name of the field at `ix`; the unit slot reports `"unit"`.
    pub fn name(&self, ix: usize) -> Option<&str> {
        if ix == self.unit_index() {
            return Some(UNIT);
        }
        self.fields.get(ix).map(|f| f.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoupledField> {
        self.fields.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn defaults(&self) -> Vec<f64> {
        self.fields.iter().map(|f| f.default_value).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn size_without_unit(&self) -> usize {
        self.fields.len()
    }

    pub fn size_with_unit(&self) -> usize {
        self.fields.len() + 1
    }

    pub fn unit_index(&self) -> usize {
        self.fields.len()
    }
}

impl TryFrom<Vec<CoupledField>> for CouplingContract {
    type Error = CouplingError;

    fn try_from(fields: Vec<CoupledField>) -> Result<Self, Self::Error> {
        let mut contract = CouplingContract::new();
        for field in fields {
            contract.add_field(field)?;
        }
        Ok(contract)
    }
}

impl From<CouplingContract> for Vec<CoupledField> {
    fn from(value: CouplingContract) -> Self {
        value.fields
    }
}

impl fmt::Display for CouplingContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (ix, field) in self.fields.iter().enumerate() {
            writeln!(f, "{ix:3}: {field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ice_input() -> CouplingContract {
        let mut contract = CouplingContract::new();
        contract
            .add(
                "surface_downward_mass_flux",
                0.0,
                "kg m-2 s-1",
                FieldFlags::on(FieldGrid::Ice),
                "Surface mass balance",
            )
            .unwrap();
        contract
            .add(
                "surface_temperature",
                273.15,
                "K",
                FieldFlags::on(FieldGrid::Ice),
                "",
            )
            .unwrap();
        contract
    }

    #[test]
    fn test_indices_follow_insertion_order() {
        let contract = ice_input();
        assert_eq!(contract.index("surface_downward_mass_flux"), Some(0));
        assert_eq!(contract.index("surface_temperature"), Some(1));
        assert_eq!(contract.index("missing"), None);
        assert_eq!(contract.size_without_unit(), 2);
        assert_eq!(contract.size_with_unit(), 3);
        assert_eq!(contract.index(UNIT), Some(2));
        assert_eq!(contract.name(2), Some(UNIT));
        assert_eq!(contract.name(1), Some("surface_temperature"));
        assert_eq!(contract.defaults(), vec![0.0, 273.15]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut contract = ice_input();
        let res = contract.add("surface_temperature", 0.0, "K", FieldFlags::none(), "");
        assert!(matches!(res, Err(CouplingError::DuplicateField { .. })));
        assert!(contract.add(UNIT, 1.0, "1", FieldFlags::none(), "").is_err());
        // The failed additions leave the contract untouched
        assert_eq!(contract.len(), 2);
        assert_eq!(contract.index("surface_temperature"), Some(1));
    }

    #[test]
    fn test_strict_lookup() {
        let contract = ice_input();
        assert_eq!(contract.index_strict("surface_temperature").unwrap(), 1);
        assert!(matches!(
            contract.index_strict("litg2"),
            Err(CouplingError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_unparseable_units_are_accepted() {
        let mut contract = CouplingContract::new();
        assert!(contract
            .add("odd", 0.0, "furlongs fortnight-1", FieldFlags::none(), "")
            .is_ok());
    }

    #[test]
    fn test_flags() {
        let flags: FieldFlags = "ELEVATION|INITIAL".parse().unwrap();
        assert_eq!(flags.grid, Some(FieldGrid::Elevation));
        assert!(flags.initial);
        assert_eq!(flags.bits(), 7);
        assert_eq!(FieldFlags::from_bits(7).unwrap(), flags);
        assert_eq!(flags.to_string(), "ELEVATION|INITIAL");

        assert_eq!(FieldFlags::on(FieldGrid::Ice).bits(), 2);
        assert_eq!("".parse::<FieldFlags>().unwrap(), FieldFlags::none());
        assert!("ICE|ELEVATION".parse::<FieldFlags>().is_err());
        assert!("SPAGHETTI".parse::<FieldFlags>().is_err());
        assert!(FieldFlags::from_bits(8).is_err());
    }

    #[test]
    fn test_serialisation() {
        let contract = ice_input();
        let serialised = serde_json::to_string_pretty(&contract).unwrap();
        let restored: CouplingContract = serde_json::from_str(&serialised).unwrap();

        assert_eq!(restored, contract);
        assert_eq!(restored.index("surface_temperature"), Some(1));
        assert_eq!(
            restored.field(0).unwrap().flags,
            FieldFlags::on(FieldGrid::Ice)
        );
    }

    #[test]
    fn test_toml_serialisation() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            input: CouplingContract,
        }

        let serialised = toml::to_string(&Wrapper {
            input: ice_input(),
        })
        .unwrap();
        let restored: Wrapper = toml::from_str(&serialised).unwrap();
        assert_eq!(restored.input, ice_input());
    }

    #[test]
    fn test_deserialising_duplicates_fails() {
        let json = r#"[
            {"name": "a", "default_value": 0.0, "units": "m"},
            {"name": "a", "default_value": 1.0, "units": "m"}
        ]"#;
        assert!(serde_json::from_str::<CouplingContract>(json).is_err());
    }
}
