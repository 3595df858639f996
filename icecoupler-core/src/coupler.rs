//! Drives the exchange between the GCM and its ice sheets.
//!
//! A [`GcmCoupler`] owns the regridding engine and one [`IceCoupler`] per ice
//! sheet. Each sheet moves through a fixed sequence of states:
//!
//! ```text
//! Uninitialized -> ContractBound -> StartTimeSet -> Ready -> TornDown
//! ```
//!
//! [`GcmCoupler::couple`] may be called any number of times once every sheet
//! is `Ready`. A failure while coupling a sheet tears that sheet down.

use crate::constants::ConstantSet;
use crate::contract::CouplingContract;
use crate::errors::{CouplingError, CouplingResult, ErrorList};
use crate::model::IceModel;
use crate::recipes::{ContractContext, ContractSet, CouplingType, GcmContracts};
use crate::regrid::{IceSheet, RegridEngine};
use crate::sparse::{SparseMatrix, SparseVector, WeightedSparse};
use crate::transformer::Axis;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis as NdAxis};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplerState {
    Uninitialized,
    ContractBound,
    StartTimeSet,
    Ready,
    TornDown,
}

impl fmt::Display for CouplerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CouplerState::Uninitialized => "uninitialized",
            CouplerState::ContractBound => "contract-bound",
            CouplerState::StartTimeSet => "start-time-set",
            CouplerState::Ready => "ready",
            CouplerState::TornDown => "torn down",
        };
        write!(f, "{}", name)
    }
}

/// Per-sheet coupling state
#[derive(Debug)]
pub struct IceCoupler {
    name: String,
    sheet_ix: usize,
    state: CouplerState,
    contracts: Option<ContractSet>,
    /// Ice from elevation, normalised
    ive: Option<SparseMatrix>,
    /// Elevation from ice, un-normalised
    evi: Option<WeightedSparse>,
    model: Box<dyn IceModel>,
}

impl IceCoupler {
    fn new(name: &str, sheet_ix: usize, model: Box<dyn IceModel>) -> Self {
        Self {
            name: name.to_string(),
            sheet_ix,
            state: CouplerState::Uninitialized,
            contracts: None,
            ive: None,
            evi: None,
            model,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CouplerState {
        self.state
    }

    pub fn contracts(&self) -> CouplingResult<&ContractSet> {
        self.contracts
            .as_ref()
            .ok_or_else(|| self.invalid_state("read its contracts"))
    }

    pub fn model(&self) -> &dyn IceModel {
        self.model.as_ref()
    }

    fn invalid_state(&self, operation: &str) -> CouplingError {
        CouplingError::InvalidState {
            sheet: self.name.clone(),
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
    }

    fn require(&self, expected: CouplerState, operation: &str) -> CouplingResult<()> {
        if self.state != expected {
            return Err(self.invalid_state(operation));
        }
        Ok(())
    }

    fn model_error(&self, err: CouplingError) -> CouplingError {
        match err {
            CouplingError::IceModel { .. } => err,
            other => CouplingError::IceModel {
                sheet: self.name.clone(),
                message: other.to_string(),
            },
        }
    }
}

/// GCM values in elevation space.
///
/// Row `k` of `values` holds the GCM output fields at elevation point
/// `index[k]` (`i1hc`).
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationValues {
    pub index: Vec<usize>,
    pub values: Array2<f64>,
}

/// Everything the ice sheets return to the GCM for one timestep.
///
/// Values are area-weighted sums; divide by `weight` (or use
/// [`GcmCoupleOutput::normalized`]) once every sheet has contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct GcmCoupleOutput {
    /// Names of the GCM input fields, in contract order
    pub fields: Vec<String>,
    /// One sparse vector over `i1hc` per GCM input field
    pub values: Vec<SparseVector>,
    /// Accumulated ice area per `i1hc`
    pub weight: SparseVector,
    /// EvI of each sheet, by sheet name
    pub evi: Vec<(String, WeightedSparse)>,
}

impl GcmCoupleOutput {
    fn new(gcm_inputs: &CouplingContract) -> Self {
        let fields: Vec<String> = gcm_inputs.names().into_iter().map(str::to_string).collect();
        Self {
            values: vec![SparseVector::new(); fields.len()],
            fields,
            weight: SparseVector::new(),
            evi: Vec::new(),
        }
    }

    fn sum_duplicates(&mut self) {
        for values in self.values.iter_mut() {
            values.sum_duplicates();
        }
        self.weight.sum_duplicates();
    }

    /// Area-weighted average of one field, keyed by `i1hc`
    pub fn normalized(&self, field: &str) -> CouplingResult<SparseVector> {
        let ix = self
            .fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| CouplingError::UnknownField {
                context: "GCM inputs".to_string(),
                name: field.to_string(),
            })?;
        Ok(self.values[ix]
            .iter()
            .filter_map(|(i1hc, v)| self.weight.get(i1hc).map(|w| (*i1hc, v / w)))
            .collect())
    }
}

/// GCM side of the coupling.
#[derive(Debug)]
pub struct GcmCoupler {
    contracts: GcmContracts,
    constants: ConstantSet,
    coupling_type: CouplingType,
    engine: RegridEngine,
    ice_couplers: Vec<IceCoupler>,
    time_base: Option<String>,
    time_start_s: Option<f64>,
    last_time_s: Option<f64>,
    /// Set after the first step that ran the ice models
    initial_delivered: bool,
}

impl GcmCoupler {
    pub fn new(
        engine: RegridEngine,
        coupling_type: CouplingType,
        constants: ConstantSet,
    ) -> CouplingResult<Self> {
        Ok(Self::with_contracts(
            engine,
            coupling_type,
            constants,
            GcmContracts::standard()?,
        ))
    }

    pub fn with_contracts(
        engine: RegridEngine,
        coupling_type: CouplingType,
        constants: ConstantSet,
        contracts: GcmContracts,
    ) -> Self {
        Self {
            contracts,
            constants,
            coupling_type,
            engine,
            ice_couplers: Vec::new(),
            time_base: None,
            time_start_s: None,
            last_time_s: None,
            initial_delivered: false,
        }
    }

    pub fn contracts(&self) -> &GcmContracts {
        &self.contracts
    }

    pub fn constants(&self) -> &ConstantSet {
        &self.constants
    }

    pub fn engine(&self) -> &RegridEngine {
        &self.engine
    }

    pub fn time_start_s(&self) -> Option<f64> {
        self.time_start_s
    }

    pub fn time_base(&self) -> Option<&str> {
        self.time_base.as_deref()
    }

    pub fn ice_couplers(&self) -> &[IceCoupler] {
        &self.ice_couplers
    }

    pub fn ice_coupler(&self, name: &str) -> Option<&IceCoupler> {
        self.ice_couplers.iter().find(|c| c.name == name)
    }

    /// Register an ice sheet and its model, binding its contracts.
    ///
    /// Contracts are built INPUT first, then the model is initialised with
    /// the sheet's grid size and elevation.
    pub fn add_ice_model(&mut self, sheet: IceSheet, model: Box<dyn IceModel>) -> CouplingResult<usize> {
        if self.time_start_s.is_some() {
            return Err(CouplingError::InvalidState {
                sheet: sheet.name,
                operation: "be added".to_string(),
                state: "the start time is already set".to_string(),
            });
        }
        if self.engine.sheet_index(&sheet.name).is_some() {
            return Err(CouplingError::InvalidGeometry(format!(
                "ice sheet '{}' is already registered",
                sheet.name
            )));
        }

        let mut coupler = IceCoupler::new(&sheet.name, self.ice_couplers.len(), model);
        info!("BEGIN binding contracts for ice sheet '{}'", coupler.name);
        let ctx = ContractContext {
            gcm: &self.contracts,
            coupling_type: self.coupling_type,
            gcm_constants: &self.constants,
        };
        let contracts = coupler.model.setup_contracts(&ctx)?;
        check_binding(&contracts, &self.contracts)?;
        coupler
            .model
            .init(sheet.n2, &sheet.elevation, &contracts)
            .map_err(|e| coupler.model_error(e))?;
        coupler.contracts = Some(contracts);
        coupler.state = CouplerState::ContractBound;

        let sheet_ix = self.engine.add_ice_sheet(sheet)?;
        coupler.sheet_ix = sheet_ix;
        info!("END binding contracts for ice sheet '{}'", coupler.name);
        self.ice_couplers.push(coupler);
        Ok(sheet_ix)
    }

    /// Set the simulation start time. May only be called once.
    pub fn set_start_time(&mut self, time_base: &str, time_start_s: f64) -> CouplingResult<()> {
        if self.time_start_s.is_some() {
            return Err(CouplingError::StartTimeAlreadySet);
        }
        for coupler in &self.ice_couplers {
            coupler.require(CouplerState::ContractBound, "set the start time")?;
        }
        self.time_base = Some(time_base.to_string());
        self.time_start_s = Some(time_start_s);
        self.last_time_s = Some(time_start_s);

        for coupler in self.ice_couplers.iter_mut() {
            if let Err(e) = coupler.model.set_start_time(time_base, time_start_s) {
                let err = coupler.model_error(e);
                coupler.state = CouplerState::TornDown;
                return Err(err);
            }
            coupler.state = CouplerState::StartTimeSet;
        }
        Ok(())
    }

    /// Validate geometry and compute every sheet's regridding matrices.
    pub fn realize(&mut self) -> CouplingResult<()> {
        for coupler in &self.ice_couplers {
            coupler.require(CouplerState::StartTimeSet, "be realized")?;
        }
        self.engine.realize()?;
        for ix in 0..self.ice_couplers.len() {
            self.refresh_matrices(ix)?;
            let coupler = &mut self.ice_couplers[ix];
            coupler.state = CouplerState::Ready;
            if let (Some(ive), Some(evi)) = (&coupler.ive, &coupler.evi) {
                info!(
                    "Ice sheet '{}' ready: IvE {} entries, EvI {} entries",
                    coupler.name,
                    ive.nnz(),
                    evi.m.nnz()
                );
            }
        }
        Ok(())
    }

    fn refresh_matrices(&mut self, ix: usize) -> CouplingResult<()> {
        let sheet_ix = self.ice_couplers[ix].sheet_ix;
        let ive = self.engine.hp_to_ice(sheet_ix)?;
        let evi = self.engine.ice_to_hc(sheet_ix)?;

        let mut errors = ErrorList::new();
        for index in ive.zero_weight_rows().into_iter().chain(evi.zero_weight_rows()) {
            errors.push(CouplingError::ZeroArea { index });
        }
        if !errors.is_empty() {
            warn!("Ice sheet '{}' has cells of zero area", self.ice_couplers[ix].name);
            errors.report();
        }
        errors.into_result()?;

        let coupler = &mut self.ice_couplers[ix];
        coupler.ive = Some(ive.normalized());
        coupler.evi = Some(evi);
        Ok(())
    }

    /// Values of a scalar contract for this timestep.
    ///
    /// Each scalar is a GCM constant of the same name if there is one, else
    /// the built-in `dt` / `by_dt`, else its default.
    pub fn resolve_scalars(&self, scalars: &CouplingContract, dt: f64) -> Vec<f64> {
        scalars
            .iter()
            .map(|field| match self.constants.get(&field.name) {
                Ok(value) => value,
                Err(_) => match field.name.as_str() {
                    "dt" => dt,
                    "by_dt" if dt > 0.0 => 1.0 / dt,
                    "by_dt" => 0.0,
                    _ => field.default_value,
                },
            })
            .collect()
    }

    /// Run one coupling step.
    ///
    /// `gcm_ovals` holds the GCM outputs at the elevation points the GCM
    /// provides; points it omits take the field defaults.
    pub fn couple(
        &mut self,
        time_s: f64,
        gcm_ovals: &ElevationValues,
        do_run: bool,
    ) -> CouplingResult<GcmCoupleOutput> {
        let last_time_s = self.last_time_s.ok_or(CouplingError::InvalidState {
            sheet: "*".to_string(),
            operation: "couple".to_string(),
            state: "no start time has been set".to_string(),
        })?;
        for coupler in &self.ice_couplers {
            coupler.require(CouplerState::Ready, "couple")?;
        }

        let dense = self.dense_gcm_outputs(gcm_ovals)?;
        let dt = time_s - last_time_s;
        let input_scalars = self.resolve_scalars(&self.contracts.ice_input_scalars, dt);
        let output_scalars = self.resolve_scalars(&self.contracts.ice_output_scalars, dt);
        let initial: Vec<bool> = self
            .contracts
            .gcm_inputs
            .iter()
            .map(|f| f.flags.initial)
            .collect();
        let skip_initial = self.initial_delivered;

        let mut out = GcmCoupleOutput::new(&self.contracts.gcm_inputs);
        for ix in 0..self.ice_couplers.len() {
            let coupler = &mut self.ice_couplers[ix];
            debug!(
                "Coupling ice sheet '{}' at t={} (dt={}, run={})",
                coupler.name, time_s, dt, do_run
            );
            let step = couple_sheet(
                coupler,
                time_s,
                dense.view(),
                &input_scalars,
                &output_scalars,
                do_run,
            )
            .and_then(|gcm_ivals| {
                accumulate(coupler, &gcm_ivals, &initial, skip_initial, &mut out)
            });
            if let Err(e) = step {
                coupler.state = CouplerState::TornDown;
                return Err(e);
            }

            let sheet_ix = coupler.sheet_ix;
            let elevation = coupler.model.elevation();
            let refreshed = self
                .engine
                .update_elevation(sheet_ix, elevation)
                .and_then(|_| self.refresh_matrices(ix));
            if let Err(e) = refreshed {
                self.ice_couplers[ix].state = CouplerState::TornDown;
                return Err(e);
            }
        }
        out.sum_duplicates();

        if do_run {
            self.initial_delivered = true;
            self.last_time_s = Some(time_s);
        }
        Ok(out)
    }

    /// GCM outputs over all of elevation space, defaults where not given
    fn dense_gcm_outputs(&self, gcm_ovals: &ElevationValues) -> CouplingResult<Array2<f64>> {
        let fields = &self.contracts.gcm_outputs;
        let n_elevation = self.engine.n_elevation();
        if gcm_ovals.values.ncols() != fields.len() {
            return Err(CouplingError::ShapeMismatch {
                what: "GCM output columns".to_string(),
                expected: fields.len(),
                found: gcm_ovals.values.ncols(),
            });
        }
        if gcm_ovals.values.nrows() != gcm_ovals.index.len() {
            return Err(CouplingError::ShapeMismatch {
                what: "GCM output rows".to_string(),
                expected: gcm_ovals.index.len(),
                found: gcm_ovals.values.nrows(),
            });
        }

        let defaults = Array1::from(fields.defaults());
        let mut dense = Array2::zeros((n_elevation, fields.len()));
        dense.assign(&defaults);
        for (&i1hc, row) in gcm_ovals.index.iter().zip(gcm_ovals.values.rows()) {
            if i1hc >= n_elevation {
                return Err(CouplingError::IndexOutOfBounds {
                    what: "elevation points".to_string(),
                    index: i1hc,
                    extent: n_elevation,
                });
            }
            dense.row_mut(i1hc).assign(&row);
        }
        Ok(dense)
    }

    /// Move every sheet to `TornDown`
    pub fn teardown(&mut self) {
        for coupler in self.ice_couplers.iter_mut() {
            if coupler.state != CouplerState::TornDown {
                info!("Tearing down ice sheet '{}'", coupler.name);
                coupler.state = CouplerState::TornDown;
            }
        }
    }
}

/// Both transformers must be bound to the GCM's own contracts
fn check_binding(contracts: &ContractSet, gcm: &GcmContracts) -> CouplingResult<()> {
    let pairs = [
        (&contracts.input, Axis::Inputs, &gcm.gcm_outputs, "GCM outputs"),
        (&contracts.input, Axis::Outputs, &contracts.input.contract, "ice inputs"),
        (&contracts.input, Axis::Scalars, &gcm.ice_input_scalars, "ice input scalars"),
        (&contracts.output, Axis::Inputs, &contracts.output.contract, "ice outputs"),
        (&contracts.output, Axis::Outputs, &gcm.gcm_inputs, "GCM inputs"),
        (&contracts.output, Axis::Scalars, &gcm.ice_output_scalars, "ice output scalars"),
    ];
    for (side, axis, expected, what) in pairs {
        if side.transformer.contract(axis)?.names() != expected.names() {
            return Err(CouplingError::Error(format!(
                "transformer {axis} axis is not bound to the {what}"
            )));
        }
        if !side.transformer.is_allocated() {
            return Err(CouplingError::NotAllocated);
        }
    }
    Ok(())
}

/// INPUT transform, regrid to ice, run the model, OUTPUT transform.
///
/// Returns the GCM input fields on the ice grid.
fn couple_sheet(
    coupler: &mut IceCoupler,
    time_s: f64,
    gcm_ovals: ndarray::ArrayView2<f64>,
    input_scalars: &[f64],
    output_scalars: &[f64],
    do_run: bool,
) -> CouplingResult<Array2<f64>> {
    let (Some(contracts), Some(ive)) = (&coupler.contracts, &coupler.ive) else {
        return Err(coupler.invalid_state("couple"));
    };
    let n2 = ive.shape().0;

    // Ice input fields at every elevation point
    let hp_ivals = contracts
        .input
        .transformer
        .apply_rows(gcm_ovals, input_scalars)?;

    let covered: std::collections::BTreeSet<usize> = ive.iter().map(|e| e.row).collect();
    if covered.len() < n2 {
        warn!(
            "{} of {} cells of ice sheet '{}' have no coupled values, using defaults",
            n2 - covered.len(),
            n2,
            coupler.name
        );
    }
    let defaults = contracts.input.contract.defaults();
    let mut ice_ivals = Array2::zeros((n2, defaults.len()));
    for (k, column) in hp_ivals.axis_iter(NdAxis(1)).enumerate() {
        let regridded = ive.apply(&column.to_vec())?;
        for (i2, value) in regridded.into_iter().enumerate() {
            ice_ivals[[i2, k]] = if covered.contains(&i2) {
                value
            } else {
                defaults[k]
            };
        }
    }

    let ice_ovals = coupler
        .model
        .run_timestep(time_s, ice_ivals.view(), do_run)
        .map_err(|e| coupler.model_error(e))?;
    let expected = (n2, contracts.output.contract.len());
    if ice_ovals.dim() != expected {
        return Err(CouplingError::IceModel {
            sheet: coupler.name.clone(),
            message: format!(
                "returned outputs of shape {:?}, expected {:?}",
                ice_ovals.dim(),
                expected
            ),
        });
    }

    contracts
        .output
        .transformer
        .apply_rows(ice_ovals.view(), output_scalars)
}

/// Regrid the GCM inputs to elevation space and add them to `out`
fn accumulate(
    coupler: &IceCoupler,
    gcm_ivals: &Array2<f64>,
    initial: &[bool],
    skip_initial: bool,
    out: &mut GcmCoupleOutput,
) -> CouplingResult<()> {
    let Some(evi) = &coupler.evi else {
        return Err(coupler.invalid_state("couple"));
    };
    let rows: std::collections::BTreeSet<usize> = evi.m.iter().map(|e| e.row).collect();
    for (k, column) in gcm_ivals.axis_iter(NdAxis(1)).enumerate() {
        if skip_initial && initial[k] {
            continue;
        }
        let summed = evi.m.apply(&column.to_vec())?;
        for &row in &rows {
            out.values[k].add(row, summed[row]);
        }
    }
    out.weight.append(&evi.weight);
    out.evi.push((coupler.name.clone(), evi.clone()));
    Ok(())
}
