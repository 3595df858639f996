//! A deliberately simple ice model for exercising the coupler.
//!
//! The surface moves with the surface mass balance and the surface enthalpy
//! follows the imposed surface temperature. There is no ice dynamics.

use icecoupler_core::errors::{CouplingError, CouplingResult};
use icecoupler_core::model::IceModel;
use icecoupler_core::recipes::{ContractSet, MASS_FLUX, SURFACE_TEMPERATURE};
use log::debug;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Physical constants the model takes from its constant set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DismalParameters {
    /// unit: kg m-3
    pub ice_density: f64,
    /// unit: J kg-1 K-1
    pub ice_specific_heat_capacity: f64,
    /// unit: K
    pub melting_point: f64,
    /// unit: K
    pub enthalpy_reference_temperature: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DismalIceModel {
    parameters: Option<DismalParameters>,
    elevation: Vec<f64>,
    input_names: Vec<String>,
    output_defaults: Vec<f64>,
    mass_flux_ix: usize,
    /// Absent under Neumann coupling
    temperature_ix: Option<usize>,
    usurf_ix: usize,
    enth_ix: usize,
    last_time_s: Option<f64>,
}

impl DismalIceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Specific enthalpy of ice at `temperature`, capped at the melting point
    pub fn specific_enthalpy(parameters: &DismalParameters, temperature: f64) -> f64 {
        parameters.ice_specific_heat_capacity
            * (temperature.min(parameters.melting_point) - parameters.enthalpy_reference_temperature)
    }

    fn parameters(&self) -> CouplingResult<&DismalParameters> {
        self.parameters.as_ref().ok_or(CouplingError::IceModel {
            sheet: "dismal".to_string(),
            message: "model has not been initialised".to_string(),
        })
    }
}

#[typetag::serde]
impl IceModel for DismalIceModel {
    fn init(&mut self, n_ice: usize, elevation: &[f64], contracts: &ContractSet) -> CouplingResult<()> {
        if elevation.len() != n_ice {
            return Err(CouplingError::ShapeMismatch {
                what: "initial elevation".to_string(),
                expected: n_ice,
                found: elevation.len(),
            });
        }
        let constants = &contracts.constants;
        self.parameters = Some(DismalParameters {
            ice_density: constants.get_as("ice_density", "kg m-3")?,
            ice_specific_heat_capacity: constants
                .get_as("ice_specific_heat_capacity", "J kg-1 K-1")?,
            melting_point: constants.get_as("water_melting_point_temperature", "K")?,
            enthalpy_reference_temperature: constants
                .get_as("enthalpy_reference_temperature", "K")?,
        });

        let input = &contracts.input.contract;
        let output = &contracts.output.contract;
        self.elevation = elevation.to_vec();
        self.input_names = input.names().into_iter().map(str::to_string).collect();
        self.output_defaults = output.defaults();
        self.mass_flux_ix = input.index_strict(MASS_FLUX)?;
        self.temperature_ix = input.index(SURFACE_TEMPERATURE);
        self.usurf_ix = output.index_strict("usurf")?;
        self.enth_ix = output.index_strict("ice_surface_enth")?;
        Ok(())
    }

    fn set_start_time(&mut self, _time_base: &str, time_start_s: f64) -> CouplingResult<()> {
        self.last_time_s = Some(time_start_s);
        Ok(())
    }

    fn elevation(&self) -> Vec<f64> {
        self.elevation.clone()
    }

    fn run_timestep(
        &mut self,
        time_s: f64,
        ice_ivals: ArrayView2<f64>,
        do_run: bool,
    ) -> CouplingResult<Array2<f64>> {
        let parameters = self.parameters()?.clone();
        let expected = (self.elevation.len(), self.input_names.len());
        if ice_ivals.dim() != expected {
            return Err(CouplingError::ShapeMismatch {
                what: "dismal ice inputs".to_string(),
                expected: expected.0 * expected.1,
                found: ice_ivals.len(),
            });
        }

        if do_run {
            let dt = self.last_time_s.map(|t| time_s - t).unwrap_or(0.0);
            if dt > 0.0 {
                let smb = ice_ivals.column(self.mass_flux_ix);
                for (elev, smb) in self.elevation.iter_mut().zip(smb) {
                    *elev += smb * dt / parameters.ice_density;
                }
            }
            debug!("dismal: advanced {} s to t={}", dt, time_s);
            self.last_time_s = Some(time_s);
        }

        let mut out = Array2::zeros((self.elevation.len(), self.output_defaults.len()));
        out.assign(&Array1::from(self.output_defaults.clone()));
        out.column_mut(self.usurf_ix)
            .assign(&Array1::from(self.elevation.clone()));
        if let Some(temp) = self.temperature_ix {
            let enthalpy = ice_ivals
                .column(temp)
                .mapv(|t| Self::specific_enthalpy(&parameters, t));
            out.column_mut(self.enth_ix).assign(&enthalpy);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icecoupler_core::constants::ConstantSet;
    use icecoupler_core::recipes::{
        standard_contracts, ContractContext, CouplingType, GcmContracts,
    };
    use is_close::is_close;

    fn contracts(coupling_type: CouplingType) -> ContractSet {
        let gcm = GcmContracts::standard().unwrap();
        let constants = ConstantSet::gcm_standard();
        standard_contracts(&ContractContext {
            gcm: &gcm,
            coupling_type,
            gcm_constants: &constants,
        })
        .unwrap()
    }

    #[test]
    fn test_surface_moves_with_smb() {
        let contracts = contracts(CouplingType::DirichletBc);
        let mut model = DismalIceModel::new();
        model.init(2, &[100.0, 200.0], &contracts).unwrap();
        model.set_start_time("seconds since 2000-01-01", 0.0).unwrap();

        // mass flux, enthalpy flux, surface temperature
        let ivals = ndarray::array![[916.6, 0.0, 263.15], [-916.6, 0.0, 280.0]];
        let out = model.run_timestep(10.0, ivals.view(), true).unwrap();

        let elevation = model.elevation();
        assert!(is_close!(elevation[0], 110.0));
        assert!(is_close!(elevation[1], 190.0));
        assert!(is_close!(out[[0, 0]], 110.0));

        // 2060 * (263.15 - 223.15), and capped at the melting point
        assert!(is_close!(out[[0, 1]], 82400.0));
        assert!(is_close!(out[[1, 1]], 103000.0));
    }

    #[test]
    fn test_refresh_does_not_step() {
        let contracts = contracts(CouplingType::DirichletBc);
        let mut model = DismalIceModel::new();
        model.init(1, &[100.0], &contracts).unwrap();
        model.set_start_time("seconds since 2000-01-01", 0.0).unwrap();

        let ivals = ndarray::array![[1.0, 0.0, 263.15]];
        model.run_timestep(10.0, ivals.view(), false).unwrap();
        assert_eq!(model.elevation(), vec![100.0]);
    }

    #[test]
    fn test_neumann_has_no_temperature() {
        let contracts = contracts(CouplingType::NeumannBc);
        let mut model = DismalIceModel::new();
        model.init(1, &[0.0], &contracts).unwrap();
        let ivals = ndarray::array![[0.0, 0.0, 5.0]];
        let out = model.run_timestep(0.0, ivals.view(), true).unwrap();
        assert_eq!(out[[0, 1]], 0.0);
    }

    #[test]
    fn test_rejects_wrong_inputs() {
        let contracts = contracts(CouplingType::DirichletBc);
        let mut model = DismalIceModel::new();
        assert!(model
            .run_timestep(0.0, ndarray::array![[0.0]].view(), true)
            .is_err());
        model.init(1, &[0.0], &contracts).unwrap();
        assert!(matches!(
            model.run_timestep(0.0, ndarray::array![[0.0, 1.0]].view(), true),
            Err(CouplingError::ShapeMismatch { .. })
        ));
        assert!(model.init(2, &[0.0], &contracts).is_err());
    }

    #[test]
    fn test_requires_surface_fields() {
        let mut contracts = contracts(CouplingType::DirichletBc);
        contracts.output.contract = icecoupler_core::contract::CouplingContract::new();
        let mut model = DismalIceModel::new();
        assert!(matches!(
            model.init(1, &[0.0], &contracts),
            Err(CouplingError::UnknownField { name, .. }) if name == "usurf"
        ));
    }
}
