//! Area-weighted regridding between ice grids, height classes and GCM cells.
//!
//! Each [`IceSheet`] describes how its cells overlap the GCM grid as a list of
//! `(gcm_cell, ice_cell, area)` triples. Overlap areas come from an external
//! polygon clipper and are measured on the ice sheet's projected plane.
//!
//! From these the [`RegridEngine`] derives:
//!
//! * `fgice`, the fraction of each GCM cell covered by ice, and `fhc`, the
//!   fraction of that ice in each height class ([`RegridEngine::compute_fhc`]);
//! * the matrix from height points to height classes
//!   ([`RegridEngine::hp_to_hc`]);
//! * per sheet, the elevation-from-ice (EvI) and ice-from-elevation (IvE)
//!   matrices used every coupling step.
//!
//! Areas are summed into an explicit [`AreaAccumulator`] which is passed
//! around by reference, so several sheets (or several batches of overlaps for
//! one sheet) can contribute to the same totals.

use crate::errors::{CouplingError, CouplingResult, ErrorList};
use crate::grid::{area_of_proj_polygon, ElevationClasses, GcmGrid, HcIndex, MapProjection};
use crate::sparse::{multiply, SparseAccumulator, SparseMatrix, SparseVector, WeightedSparse};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Area shared by one GCM cell and one ice cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    pub i1: usize,
    pub i2: usize,
    pub area: f64,
}

/// The elevation space a sheet's matrices are built in.
///
/// GCM cells masked out here are dropped from every matrix and area total.
#[derive(Debug, Clone, Copy)]
pub struct ElevationSpace<'a> {
    pub classes: &'a ElevationClasses,
    pub hcix: HcIndex,
    /// `true` where the GCM cell takes part in coupling; absent means all do
    pub gcm_mask: Option<&'a [bool]>,
}

impl ElevationSpace<'_> {
    pub fn is_active(&self, i1: usize) -> bool {
        match self.gcm_mask {
            Some(mask) => mask.get(i1).copied().unwrap_or(false),
            None => true,
        }
    }

    fn n_elevation(&self) -> usize {
        self.hcix.n1 * self.classes.nhc()
    }
}

/// Running area totals, per GCM cell and per (GCM cell, height class).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaAccumulator {
    /// Ice area per GCM cell
    pub by_cell: SparseAccumulator<usize>,
    /// Ice area per elevation-space index `i1hc`
    pub by_hc: SparseAccumulator<usize>,
}

impl AreaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: &AreaAccumulator) {
        self.by_cell.merge(&other.by_cell);
        self.by_hc.merge(&other.by_hc);
    }
}

/// Geometry of one ice sheet as seen by the coupler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceSheet {
    pub name: String,
    /// Number of ice grid cells
    pub n2: usize,
    pub projection: MapProjection,
    pub overlaps: Vec<Overlap>,
    /// Surface elevation of each ice cell (m)
    pub elevation: Vec<f64>,
    /// `true` where the ice cell is ice covered; absent means all cells are
    #[serde(default)]
    pub mask: Option<Vec<bool>>,
}

impl IceSheet {
    pub fn new(name: &str, n2: usize, projection: MapProjection) -> Self {
        Self {
            name: name.to_string(),
            n2,
            projection,
            overlaps: Vec::new(),
            elevation: vec![0.0; n2],
            mask: None,
        }
    }

    pub fn with_elevation(mut self, elevation: Vec<f64>) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn add_overlap(&mut self, i1: usize, i2: usize, area: f64) {
        self.overlaps.push(Overlap { i1, i2, area });
    }

    /// Whether ice cell `i2` takes part in coupling
    pub fn is_ice(&self, i2: usize) -> bool {
        let masked_in = match &self.mask {
            Some(mask) => mask.get(i2).copied().unwrap_or(false),
            None => true,
        };
        masked_in && self.elevation.get(i2).is_some_and(|e| e.is_finite())
    }

    /// Overlaps between ice-covered cells and active GCM cells
    fn ice_overlaps<'a>(&'a self, space: &'a ElevationSpace<'a>) -> impl Iterator<Item = &'a Overlap> {
        self.overlaps
            .iter()
            .filter(|o| self.is_ice(o.i2) && space.is_active(o.i1))
    }

    /// Check array extents against the ice grid and the GCM grid
    pub fn validate(&self, n1: usize) -> CouplingResult<()> {
        if self.elevation.len() != self.n2 {
            return Err(CouplingError::ShapeMismatch {
                what: format!("elevation for {}", self.name),
                expected: self.n2,
                found: self.elevation.len(),
            });
        }
        if let Some(mask) = &self.mask {
            if mask.len() != self.n2 {
                return Err(CouplingError::ShapeMismatch {
                    what: format!("mask for {}", self.name),
                    expected: self.n2,
                    found: mask.len(),
                });
            }
        }
        for overlap in &self.overlaps {
            if overlap.i1 >= n1 {
                return Err(CouplingError::IndexOutOfBounds {
                    what: format!("GCM cell of {} overlap", self.name),
                    index: overlap.i1,
                    extent: n1,
                });
            }
            if overlap.i2 >= self.n2 {
                return Err(CouplingError::IndexOutOfBounds {
                    what: format!("ice cell of {} overlap", self.name),
                    index: overlap.i2,
                    extent: self.n2,
                });
            }
            if !(overlap.area.is_finite() && overlap.area >= 0.0) {
                return Err(CouplingError::InvalidGeometry(format!(
                    "{} overlap ({}, {}) has area {}",
                    self.name, overlap.i1, overlap.i2, overlap.area
                )));
            }
        }
        Ok(())
    }

    /// Add this sheet's ice-covered overlap areas to `acc`.
    pub fn accum_areas(&self, space: &ElevationSpace, acc: &mut AreaAccumulator) {
        for overlap in self.ice_overlaps(space) {
            let hc = space.classes.class_of(self.elevation[overlap.i2]);
            acc.by_cell.add(overlap.i1, overlap.area);
            acc.by_hc.add(space.hcix.ik_to_index(overlap.i1, hc), overlap.area);
        }
    }

    /// Elevation classes from ice (EvI), un-normalised.
    ///
    /// Shape `(n1 * nhc, n2)`; each row is weighted by its accumulated area.
    pub fn ice_to_hc(&self, space: &ElevationSpace) -> CouplingResult<WeightedSparse> {
        let mut ret = WeightedSparse::new((space.n_elevation(), self.n2));
        for overlap in self.ice_overlaps(space) {
            let hc = space.classes.class_of(self.elevation[overlap.i2]);
            let row = space.hcix.ik_to_index(overlap.i1, hc);
            ret.m.add(row, overlap.i2, overlap.area)?;
            ret.weight.add(row, overlap.area);
        }
        ret.sum_duplicates();
        Ok(ret)
    }

    /// Ice from height points (IvE), un-normalised.
    ///
    /// Each overlap spreads its area over the height points bracketing the
    /// ice cell's elevation. Shape `(n2, n1 * nhc)`; rows are weighted by the
    /// ice cell's overlap area.
    pub fn hp_to_ice(&self, space: &ElevationSpace) -> CouplingResult<WeightedSparse> {
        let mut ret = WeightedSparse::new((self.n2, space.n_elevation()));
        for overlap in self.ice_overlaps(space) {
            for (hp, w) in space.classes.interpolation_weights(self.elevation[overlap.i2]) {
                ret.m.add(
                    overlap.i2,
                    space.hcix.ik_to_index(overlap.i1, hp),
                    overlap.area * w,
                )?;
            }
            ret.weight.add(overlap.i2, overlap.area);
        }
        ret.sum_duplicates();
        Ok(ret)
    }
}

/// Ice fractions of the GCM grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractionResult {
    /// Fraction of each GCM cell covered by ice, keyed by `i1`
    pub fgice: SparseVector,
    /// Fraction of a cell's ice in each height class, keyed by `i1hc`
    pub fhc: SparseVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegridEngine {
    grid: GcmGrid,
    classes: ElevationClasses,
    /// `true` where the GCM cell takes part in coupling; absent means all do
    #[serde(default)]
    gcm_mask: Option<Vec<bool>>,
    sheets: Vec<IceSheet>,
}

impl RegridEngine {
    pub fn new(grid: GcmGrid, classes: ElevationClasses) -> Self {
        Self {
            grid,
            classes,
            gcm_mask: None,
            sheets: Vec::new(),
        }
    }

    /// Restrict coupling to the GCM cells where `mask` is `true`
    pub fn with_gcm_mask(mut self, mask: Vec<bool>) -> Self {
        self.gcm_mask = Some(mask);
        self
    }

    pub fn gcm_mask(&self) -> Option<&[bool]> {
        self.gcm_mask.as_deref()
    }

    pub fn space(&self) -> ElevationSpace<'_> {
        ElevationSpace {
            classes: &self.classes,
            hcix: self.hc_index(),
            gcm_mask: self.gcm_mask(),
        }
    }

    pub fn grid(&self) -> &GcmGrid {
        &self.grid
    }

    pub fn classes(&self) -> &ElevationClasses {
        &self.classes
    }

    pub fn hc_index(&self) -> HcIndex {
        HcIndex::new(self.grid.n1())
    }

    /// Size of elevation space, `n1 * nhc`
    pub fn n_elevation(&self) -> usize {
        self.grid.n1() * self.classes.nhc()
    }

    pub fn add_ice_sheet(&mut self, sheet: IceSheet) -> CouplingResult<usize> {
        if sheet.name.is_empty() {
            return Err(CouplingError::InvalidGeometry(
                "an ice sheet must have a name".to_string(),
            ));
        }
        if self.sheet_index(&sheet.name).is_some() {
            return Err(CouplingError::InvalidGeometry(format!(
                "ice sheet '{}' is already registered",
                sheet.name
            )));
        }
        let ix = self.sheets.len();
        debug!("Registered ice sheet '{}' as {}", sheet.name, ix);
        self.sheets.push(sheet);
        Ok(ix)
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn sheet(&self, ix: usize) -> CouplingResult<&IceSheet> {
        self.sheets.get(ix).ok_or(CouplingError::IndexOutOfBounds {
            what: "ice sheets".to_string(),
            index: ix,
            extent: self.sheets.len(),
        })
    }

    pub fn sheets(&self) -> &[IceSheet] {
        &self.sheets
    }

    /// Validate the GCM mask and every sheet against the GCM grid.
    pub fn realize(&self) -> CouplingResult<()> {
        let n1 = self.grid.n1();
        if let Some(mask) = &self.gcm_mask {
            if mask.len() != n1 {
                return Err(CouplingError::ShapeMismatch {
                    what: "GCM mask".to_string(),
                    expected: n1,
                    found: mask.len(),
                });
            }
        }
        for sheet in &self.sheets {
            sheet.validate(n1)?;
        }
        info!(
            "Regridding realized: {} GCM cells, {} height classes, {} ice sheets",
            n1,
            self.classes.nhc(),
            self.sheets.len()
        );
        Ok(())
    }

    /// Total ice areas over every sheet
    pub fn accumulate_areas(&self) -> AreaAccumulator {
        let space = self.space();
        let mut acc = AreaAccumulator::new();
        for sheet in &self.sheets {
            sheet.accum_areas(&space, &mut acc);
        }
        acc
    }

    /// Ice fraction of every GCM cell and the split of that ice between
    /// height classes.
    ///
    /// Each sheet's ice area is divided by the GCM cell's area as projected
    /// into that sheet's own plane, so the areas being compared share a
    /// projection.
    pub fn compute_fhc(&self) -> CouplingResult<FractionResult> {
        let space = self.space();
        let mut fgice = SparseVector::new();
        let mut global = AreaAccumulator::new();

        for sheet in &self.sheets {
            let mut local = AreaAccumulator::new();
            sheet.accum_areas(&space, &mut local);
            for (&i1, &area) in local.by_cell.iter() {
                let area1 = area_of_proj_polygon(self.grid.polygon(i1)?, &sheet.projection);
                if area1 <= 0.0 {
                    return Err(CouplingError::InvalidGeometry(format!(
                        "GCM cell {} has no area in the projection of {}",
                        i1, sheet.name
                    )));
                }
                fgice.add(i1, area / area1);
            }
            global.merge(&local);
        }

        let mut fhc = SparseVector::new();
        for (&i1hc, &area) in global.by_hc.iter() {
            let (i1, _) = space.hcix.index_to_ik(i1hc);
            fhc.add(i1hc, area / global.by_cell.get(&i1));
        }

        fgice.sum_duplicates();
        fhc.sum_duplicates();
        Ok(FractionResult { fgice, fhc })
    }

    /// Matrix from height points to height classes over every sheet.
    ///
    /// Rows whose accumulated area is zero are divided by zero; each such row
    /// is recorded as [`CouplingError::ZeroArea`] in `errors`.
    pub fn hp_to_hc(&self, errors: &mut ErrorList) -> CouplingResult<SparseMatrix> {
        let space = self.space();
        let n = self.n_elevation();
        let mut ret = SparseMatrix::new((n, n));
        let mut acc = AreaAccumulator::new();

        for sheet in &self.sheets {
            sheet.accum_areas(&space, &mut acc);
            let ice_to_hc = sheet.ice_to_hc(&space)?;
            let hp_to_ice = sheet.hp_to_ice(&space)?;
            ret.append(&multiply(&ice_to_hc.m, &hp_to_ice.normalized())?)?;
        }

        let zero_rows: BTreeSet<usize> = ret
            .iter()
            .map(|e| e.row)
            .filter(|row| acc.by_hc.get(row) == 0.0)
            .collect();
        for index in zero_rows {
            errors.push(CouplingError::ZeroArea { index });
        }

        ret.divide_rows_by(&acc.by_hc);
        ret.sum_duplicates();
        Ok(ret)
    }

    /// EvI for one sheet
    pub fn ice_to_hc(&self, sheet_ix: usize) -> CouplingResult<WeightedSparse> {
        self.sheet(sheet_ix)?.ice_to_hc(&self.space())
    }

    /// IvE for one sheet
    pub fn hp_to_ice(&self, sheet_ix: usize) -> CouplingResult<WeightedSparse> {
        self.sheet(sheet_ix)?.hp_to_ice(&self.space())
    }

    /// Replace a sheet's surface elevation.
    pub fn update_elevation(&mut self, sheet_ix: usize, elevation: Vec<f64>) -> CouplingResult<()> {
        let extent = self.sheets.len();
        let sheet = self
            .sheets
            .get_mut(sheet_ix)
            .ok_or(CouplingError::IndexOutOfBounds {
                what: "ice sheets".to_string(),
                index: sheet_ix,
                extent,
            })?;
        if elevation.len() != sheet.n2 {
            return Err(CouplingError::ShapeMismatch {
                what: format!("elevation for {}", sheet.name),
                expected: sheet.n2,
                found: elevation.len(),
            });
        }
        sheet.elevation = elevation;
        Ok(())
    }
}
