//! TOML configuration of a coupled run.
//!
//! ```toml
//! coupling_type = "DirichletBc"
//! hpdefs = [0.0, 500.0, 1000.0, 2000.0]
//!
//! [constants."constant::lhm"]
//! value = 334000.0
//! units = "J kg-1"
//!
//! [[ice_sheets]]
//! name = "greenland"
//! model = "dismal"
//! ```
//!
//! Constants given here are layered over [`ConstantSet::gcm_standard`].

use crate::constants::ConstantSet;
use crate::coupler::GcmCoupler;
use crate::errors::{CouplingError, CouplingResult};
use crate::grid::{ElevationClasses, GcmGrid};
use crate::recipes::CouplingType;
use crate::regrid::RegridEngine;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One ice sheet and the kind of model that runs it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceSheetConfig {
    pub name: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingConfig {
    #[serde(default)]
    pub coupling_type: CouplingType,
    pub hpdefs: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hcmax: Option<Vec<f64>>,
    #[serde(default)]
    pub constants: ConstantSet,
    #[serde(default)]
    pub ice_sheets: Vec<IceSheetConfig>,
}

impl CouplingConfig {
    pub fn from_toml_str(text: &str) -> CouplingResult<Self> {
        toml::from_str(text).map_err(|e| CouplingError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> CouplingResult<Self> {
        let path = path.as_ref();
        info!("Reading coupling configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> CouplingResult<String> {
        toml::to_string(self).map_err(|e| CouplingError::Config(e.to_string()))
    }

    pub fn elevation_classes(&self) -> CouplingResult<ElevationClasses> {
        ElevationClasses::new(self.hpdefs.clone(), self.hcmax.clone())
    }

    /// GCM constants with the configured overrides applied
    pub fn gcm_constants(&self) -> ConstantSet {
        let mut constants = ConstantSet::gcm_standard();
        constants.merge(&self.constants);
        constants
    }

    /// A coupler over `grid` with no ice sheets registered yet
    pub fn build_coupler(&self, grid: GcmGrid) -> CouplingResult<GcmCoupler> {
        let engine = RegridEngine::new(grid, self.elevation_classes()?);
        GcmCoupler::new(engine, self.coupling_type, self.gcm_constants())
    }
}
