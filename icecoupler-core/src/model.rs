//! The interface between the coupler and a concrete ice-sheet model.
//!
//! Ice models are stored as `Box<dyn IceModel>` and serialised through
//! `typetag`, so a configured coupler can be written out and read back
//! without knowing the concrete model types.

use crate::errors::CouplingResult;
use crate::recipes::{standard_contracts, ContractContext, ContractSet};
use ndarray::{Array2, ArrayView2};
use std::fmt::Debug;

/// An ice-sheet model driven by the coupler.
///
/// Values cross the boundary as 2-D arrays with one row per ice grid cell
/// and one column per field of the relevant contract:
/// inputs follow [`ContractSet::input`], outputs [`ContractSet::output`].
#[typetag::serde(tag = "type")]
pub trait IceModel: Debug + Send {
    /// Build the sheet's INPUT and OUTPUT contracts and transforms.
    ///
    /// The default uses the standard recipes.
    fn setup_contracts(&self, ctx: &ContractContext) -> CouplingResult<ContractSet> {
        standard_contracts(ctx)
    }

    /// Called once the contracts are known
    fn init(&mut self, n_ice: usize, elevation: &[f64], contracts: &ContractSet) -> CouplingResult<()>;

    fn set_start_time(&mut self, _time_base: &str, _time_start_s: f64) -> CouplingResult<()> {
        Ok(())
    }

    /// Current surface elevation on the ice grid
    fn elevation(&self) -> Vec<f64>;

    /// Advance to `time_s` with the given inputs and return the outputs.
    ///
    /// With `do_run == false` the model only refreshes its outputs without
    /// stepping forward in time.
    fn run_timestep(
        &mut self,
        time_s: f64,
        ice_ivals: ArrayView2<f64>,
        do_run: bool,
    ) -> CouplingResult<Array2<f64>>;
}
