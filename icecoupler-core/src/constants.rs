//! Named physical constants shared between the GCM and the ice models.
//!
//! The GCM publishes its constants under its own names (`constant::tf`,
//! `seaice::dtdp`, ...). Each ice model builds its own [`ConstantSet`] from
//! them with [`ConstantSet::transfer`], renaming and rescaling as needed.

use crate::errors::{CouplingError, CouplingResult};
use crate::units::Unit;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single named constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub value: f64,
    pub units: String,
    #[serde(default)]
    pub description: String,
}

/// Ordered map of constant name to value and units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstantSet {
    constants: BTreeMap<String, Constant>,
}

impl ConstantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constants published by the GCM.
    ///
    /// Values follow the GCM's thermodynamics (1 atm, 0 degC reference).
    pub fn gcm_standard() -> Self {
        let mut set = Self::new();
        for (name, value, units, description) in [
            ("constant::grav", 9.80665, "m s-2", "Standard gravity"),
            ("constant::tf", 273.15, "K", "Freezing point of water at 1 atm"),
            ("constant::lhm", 3.34e5, "J kg-1", "Latent heat of melt"),
            ("constant::shw", 4185.0, "J kg-1 K-1", "Heat capacity of water"),
            ("constant::shi", 2060.0, "J kg-1 K-1", "Heat capacity of pure ice"),
            ("constant::rhoi", 916.6, "kg m-3", "Density of pure ice"),
            ("constant::rhow", 1000.0, "kg m-3", "Density of pure water"),
            ("constant::rhows", 1030.0, "kg m-3", "Density of sea water"),
            ("constant::gasc", 8.314462, "J mol-1 K-1", "Ideal gas constant"),
            (
                "seaice::dtdp",
                -8.8e-8,
                "K Pa-1",
                "Melting point depression with pressure",
            ),
            ("seaice::alami0", 2.11, "W m-1 K-1", "Ice thermal conductivity"),
        ] {
            set.constants.insert(
                name.to_string(),
                Constant {
                    value,
                    units: units.to_string(),
                    description: description.to_string(),
                },
            );
        }
        set
    }

    /// Define or replace a constant.
    pub fn set(&mut self, name: &str, value: f64, units: &str, description: &str) {
        if let Err(e) = Unit::parse(units) {
            warn!("Constant '{}' has unparseable units '{}': {}", name, units, e);
        }
        self.constants.insert(
            name.to_string(),
            Constant {
                value,
                units: units.to_string(),
                description: description.to_string(),
            },
        );
    }

    pub fn constant(&self, name: &str) -> CouplingResult<&Constant> {
        self.constants
            .get(name)
            .ok_or_else(|| CouplingError::UnknownConstant(name.to_string()))
    }

    /// Value in the constant's own units
    pub fn get(&self, name: &str) -> CouplingResult<f64> {
        Ok(self.constant(name)?.value)
    }

    /// Value converted into `units`.
    pub fn get_as(&self, name: &str, units: &str) -> CouplingResult<f64> {
        let constant = self.constant(name)?;
        let conversion_error = |details: String| CouplingError::UnitConversion {
            from: constant.units.clone(),
            to: units.to_string(),
            details,
        };
        let from = Unit::parse(&constant.units).map_err(|e| conversion_error(e.to_string()))?;
        let to = Unit::parse(units).map_err(|e| conversion_error(e.to_string()))?;
        from.convert_to(constant.value, &to)
            .map_err(|e| conversion_error(e.to_string()))
    }

    /// Copy `src_name` from another set under the name `dst_name`, scaled by
    /// `multiplier`.
    pub fn transfer(
        &mut self,
        dst_name: &str,
        src: &ConstantSet,
        src_name: &str,
        multiplier: f64,
    ) -> CouplingResult<()> {
        let constant = src.constant(src_name)?;
        self.constants.insert(
            dst_name.to_string(),
            Constant {
                value: constant.value * multiplier,
                units: constant.units.clone(),
                description: constant.description.clone(),
            },
        );
        Ok(())
    }

    /// Overlay every constant of `other` onto this set
    pub fn merge(&mut self, other: &ConstantSet) {
        for (name, constant) in &other.constants {
            self.constants.insert(name.clone(), constant.clone());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constants.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Constant)> {
        self.constants.iter()
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn test_missing_constant() {
        let set = ConstantSet::new();
        assert!(matches!(
            set.get("constant::tf"),
            Err(CouplingError::UnknownConstant(_))
        ));
    }

    #[test]
    fn test_get_as() {
        let mut set = ConstantSet::new();
        set.set("lhm", 334.0, "kJ kg-1", "");
        assert!(is_close!(set.get_as("lhm", "J kg-1").unwrap(), 334000.0));
        assert!(matches!(
            set.get_as("lhm", "K"),
            Err(CouplingError::UnitConversion { .. })
        ));
    }

    #[test]
    fn test_transfer() {
        let gcm = ConstantSet::gcm_standard();
        let mut ice = ConstantSet::new();
        ice.transfer("beta_CC", &gcm, "seaice::dtdp", -1.0).unwrap();
        ice.transfer("water_melting_point_temperature", &gcm, "constant::tf", 1.0)
            .unwrap();

        assert!(is_close!(ice.get("beta_CC").unwrap(), 8.8e-8));
        assert_eq!(ice.constant("beta_CC").unwrap().units, "K Pa-1");
        assert!(is_close!(
            ice.get("water_melting_point_temperature").unwrap(),
            273.15
        ));
        assert!(ice.transfer("x", &gcm, "constant::nope", 1.0).is_err());
    }

    #[test]
    fn test_standard_units_are_consistent() {
        let gcm = ConstantSet::gcm_standard();
        assert!(is_close!(
            gcm.get_as("constant::gasc", "J mol-1 K-1").unwrap(),
            8.314462
        ));
        assert!(is_close!(
            gcm.get_as("constant::gasc", "kJ kmol-1 K-1").unwrap(),
            8.314462
        ));
        assert!(gcm.get_as("constant::gasc", "J K-1").is_err());
        for (name, constant) in gcm.iter() {
            assert!(
                crate::units::Unit::parse(&constant.units).is_ok(),
                "{name} has units {}",
                constant.units
            );
        }
    }

    #[test]
    fn test_serialisation() {
        let gcm = ConstantSet::gcm_standard();
        let serialised = toml::to_string(&gcm).unwrap();
        let restored: ConstantSet = toml::from_str(&serialised).unwrap();
        assert_eq!(restored, gcm);
    }
}
