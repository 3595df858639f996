//! An ice model that records what it is given.
//!
//! Useful for checking what crosses the boundary in each direction: every
//! step keeps both the inputs the GCM sent and the outputs returned. The
//! surface never changes and every output takes its default apart from
//! `usurf`.

use icecoupler_core::errors::{CouplingError, CouplingResult};
use icecoupler_core::model::IceModel;
use icecoupler_core::recipes::ContractSet;
use log::info;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// One call to `run_timestep`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedStep {
    pub time_s: f64,
    pub do_run: bool,
    /// One row per ice cell, columns in input contract order
    pub inputs: Array2<f64>,
    /// One row per ice cell, columns in output contract order
    pub outputs: Array2<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterIceModel {
    elevation: Vec<f64>,
    input_names: Vec<String>,
    output_names: Vec<String>,
    output_defaults: Vec<f64>,
    usurf_ix: usize,
    time_base: Option<String>,
    steps: Vec<RecordedStep>,
}

impl WriterIceModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[RecordedStep] {
        &self.steps
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn time_base(&self) -> Option<&str> {
        self.time_base.as_deref()
    }

    /// Recorded values of one input field, one entry per step
    pub fn field_history(&self, name: &str) -> CouplingResult<Vec<Array1<f64>>> {
        let ix = position(&self.input_names, name, "writer inputs")?;
        Ok(self
            .steps
            .iter()
            .map(|step| step.inputs.column(ix).to_owned())
            .collect())
    }

    /// Recorded values of one output field, one entry per step
    pub fn output_history(&self, name: &str) -> CouplingResult<Vec<Array1<f64>>> {
        let ix = position(&self.output_names, name, "writer outputs")?;
        Ok(self
            .steps
            .iter()
            .map(|step| step.outputs.column(ix).to_owned())
            .collect())
    }
}

fn position(names: &[String], name: &str, context: &str) -> CouplingResult<usize> {
    names
        .iter()
        .position(|n| n == name)
        .ok_or_else(|| CouplingError::UnknownField {
            context: context.to_string(),
            name: name.to_string(),
        })
}

#[typetag::serde]
impl IceModel for WriterIceModel {
    fn init(&mut self, n_ice: usize, elevation: &[f64], contracts: &ContractSet) -> CouplingResult<()> {
        if elevation.len() != n_ice {
            return Err(CouplingError::ShapeMismatch {
                what: "initial elevation".to_string(),
                expected: n_ice,
                found: elevation.len(),
            });
        }
        let output = &contracts.output.contract;
        self.elevation = elevation.to_vec();
        self.input_names = contracts
            .input
            .contract
            .names()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.output_names = output.names().into_iter().map(str::to_string).collect();
        self.output_defaults = output.defaults();
        self.usurf_ix = output.index_strict("usurf")?;
        self.steps.clear();
        Ok(())
    }

    fn set_start_time(&mut self, time_base: &str, time_start_s: f64) -> CouplingResult<()> {
        info!("writer: starting at {} s ({})", time_start_s, time_base);
        self.time_base = Some(time_base.to_string());
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
        if ice_ivals.ncols() != self.input_names.len() {
            return Err(CouplingError::ShapeMismatch {
                what: "writer inputs".to_string(),
                expected: self.input_names.len(),
                found: ice_ivals.ncols(),
            });
        }
        let mut out = Array2::zeros((self.elevation.len(), self.output_defaults.len()));
        out.assign(&Array1::from(self.output_defaults.clone()));
        out.column_mut(self.usurf_ix)
            .assign(&Array1::from(self.elevation.clone()));

        self.steps.push(RecordedStep {
            time_s,
            do_run,
            inputs: ice_ivals.to_owned(),
            outputs: out.clone(),
        });
        Ok(out)
    }
}
