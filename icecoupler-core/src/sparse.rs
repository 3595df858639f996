//! Coordinate-list sparse matrices and vectors.
//!
//! The regridding code builds matrices incrementally: entries are appended as
//! overlap areas are visited and the same coordinate may be contributed more
//! than once. Duplicates are kept until [`SparseMatrix::sum_duplicates`] is
//! called, which sorts the entries and sums any repeated coordinates.
//!
//! - [`SparseMatrix`]: `(row, col, value)` triples with a fixed shape
//! - [`CooVector`]: `(key, value)` pairs for an arbitrary ordered key
//! - [`SparseAccumulator`]: keyed running sums (areas, weights)
//! - [`WeightedSparse`]: a matrix paired with per-row weights
//!
//! ```rust
//! use icecoupler_core::sparse::SparseMatrix;
//!
//! let mut m = SparseMatrix::new((2, 2));
//! m.add(0, 1, 2.0).unwrap();
//! m.add(0, 1, 3.0).unwrap();
//! m.sum_duplicates();
//! assert_eq!(m.nnz(), 1);
//! assert_eq!(m.apply(&[0.0, 1.0]).unwrap(), vec![5.0, 0.0]);
//! ```

use crate::errors::{CouplingError, CouplingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single non-zero entry of a [`SparseMatrix`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub row: usize,
    pub col: usize,
    pub value: f64,
}

/// Sparse matrix stored as a list of coordinate triples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SparseMatrixData")]
pub struct SparseMatrix {
    shape: (usize, usize),
    entries: Vec<MatrixEntry>,
}

/// Serialised form of [`SparseMatrix`], bounds-checked on the way in
#[derive(Deserialize)]
struct SparseMatrixData {
    shape: (usize, usize),
    entries: Vec<MatrixEntry>,
}

impl TryFrom<SparseMatrixData> for SparseMatrix {
    type Error = CouplingError;

    fn try_from(value: SparseMatrixData) -> Result<Self, Self::Error> {
        let mut matrix = SparseMatrix::new(value.shape);
        matrix.entries.reserve(value.entries.len());
        for entry in value.entries {
            matrix.add(entry.row, entry.col, entry.value)?;
        }
        Ok(matrix)
    }
}

impl SparseMatrix {
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            shape,
            entries: Vec::new(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Number of stored entries (including duplicates)
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatrixEntry> {
        self.entries.iter()
    }

    /// Append an entry
    ///
    /// Entries at the same coordinate are not merged until [`Self::sum_duplicates`].
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> CouplingResult<()> {
        if row >= self.shape.0 {
            return Err(CouplingError::IndexOutOfBounds {
                what: "matrix row".to_string(),
                index: row,
                extent: self.shape.0,
            });
        }
        if col >= self.shape.1 {
            return Err(CouplingError::IndexOutOfBounds {
                what: "matrix column".to_string(),
                index: col,
                extent: self.shape.1,
            });
        }
        self.entries.push(MatrixEntry { row, col, value });
        Ok(())
    }

    /// Append all of the entries of another matrix with the same shape
    pub fn append(&mut self, other: &SparseMatrix) -> CouplingResult<()> {
        if other.shape != self.shape {
            return Err(CouplingError::ShapeMismatch {
                what: "appended matrix rows".to_string(),
                expected: self.shape.0,
                found: other.shape.0,
            });
        }
        self.entries.extend_from_slice(&other.entries);
        Ok(())
    }

    /// Sort entries by (row, col) and merge entries sharing a coordinate by summing them
    pub fn sum_duplicates(&mut self) {
        self.entries
            .sort_by(|a, b| (a.row, a.col).cmp(&(b.row, b.col)));

        let mut merged: Vec<MatrixEntry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            match merged.last_mut() {
                Some(last) if last.row == entry.row && last.col == entry.col => {
                    last.value += entry.value;
                }
                _ => merged.push(entry),
            }
        }
        self.entries = merged;
    }

    /// Divide every entry by the weight of its row
    ///
    /// Rows without a weight are divided by zero, which yields non-finite values.
    /// Callers that need to know which rows were affected should check
    /// [`SparseAccumulator::get`] beforehand.
    pub fn divide_rows_by(&mut self, weights: &SparseAccumulator<usize>) {
        for entry in self.entries.iter_mut() {
            entry.value /= weights.get(&entry.row);
        }
    }

    /// Sum of each row's entries
    pub fn row_sums(&self) -> SparseAccumulator<usize> {
        let mut sums = SparseAccumulator::new();
        for entry in &self.entries {
            sums.add(entry.row, entry.value);
        }
        sums
    }

    pub fn transpose(&self) -> SparseMatrix {
        SparseMatrix {
            shape: (self.shape.1, self.shape.0),
            entries: self
                .entries
                .iter()
                .map(|e| MatrixEntry {
                    row: e.col,
                    col: e.row,
                    value: e.value,
                })
                .collect(),
        }
    }

    /// Matrix-vector product `y = M x`
    pub fn apply(&self, x: &[f64]) -> CouplingResult<Vec<f64>> {
        if x.len() != self.shape.1 {
            return Err(CouplingError::ShapeMismatch {
                what: "vector multiplied by matrix".to_string(),
                expected: self.shape.1,
                found: x.len(),
            });
        }
        let mut y = vec![0.0; self.shape.0];
        for entry in &self.entries {
            y[entry.row] += entry.value * x[entry.col];
        }
        Ok(y)
    }

    /// Dense copy, mostly useful for inspection in tests
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut dense = vec![vec![0.0; self.shape.1]; self.shape.0];
        for entry in &self.entries {
            dense[entry.row][entry.col] += entry.value;
        }
        dense
    }
}

/// Sparse matrix product `a * b`
///
/// The result has its duplicates summed.
pub fn multiply(a: &SparseMatrix, b: &SparseMatrix) -> CouplingResult<SparseMatrix> {
    if a.shape.1 != b.shape.0 {
        return Err(CouplingError::ShapeMismatch {
            what: "inner dimension of matrix product".to_string(),
            expected: a.shape.1,
            found: b.shape.0,
        });
    }

    let mut b_rows: BTreeMap<usize, Vec<(usize, f64)>> = BTreeMap::new();
    for entry in &b.entries {
        b_rows
            .entry(entry.row)
            .or_default()
            .push((entry.col, entry.value));
    }

    let mut result = SparseMatrix::new((a.shape.0, b.shape.1));
    for entry in &a.entries {
        if let Some(row) = b_rows.get(&entry.col) {
            for &(col, value) in row {
                result.entries.push(MatrixEntry {
                    row: entry.row,
                    col,
                    value: entry.value * value,
                });
            }
        }
    }
    result.sum_duplicates();
    Ok(result)
}

/// Sparse vector of `(key, value)` pairs
///
/// Like [`SparseMatrix`], repeated keys are kept until [`Self::sum_duplicates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooVector<K> {
    entries: Vec<(K, f64)>,
}

/// Sparse vector indexed by a flat position
pub type SparseVector = CooVector<usize>;

impl<K: Ord + Copy> CooVector<K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, key: K, value: f64) {
        self.entries.push((key, value));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(K, f64)> {
        self.entries.iter()
    }

    /// Sort by key and sum repeated keys
    pub fn sum_duplicates(&mut self) {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut merged: Vec<(K, f64)> = Vec::with_capacity(self.entries.len());
        for (key, value) in self.entries.drain(..) {
            match merged.last_mut() {
                Some(last) if last.0 == key => last.1 += value,
                _ => merged.push((key, value)),
            }
        }
        self.entries = merged;
    }

    /// Sum of all values stored under `key`
    pub fn get(&self, key: &K) -> Option<f64> {
        let mut found = None;
        for (k, v) in &self.entries {
            if k == key {
                *found.get_or_insert(0.0) += v;
            }
        }
        found
    }

    pub fn append(&mut self, other: &CooVector<K>) {
        self.entries.extend_from_slice(&other.entries);
    }
}

impl<K: Ord + Copy> Default for CooVector<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Copy> FromIterator<(K, f64)> for CooVector<K> {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Running sums keyed by an ordered key
///
/// Adding to the same key twice sums the contributions, so the accumulator never
/// needs a separate duplicate-summing step. Missing keys read as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseAccumulator<K: Ord> {
    sums: BTreeMap<K, f64>,
}

impl<K: Ord + Copy> SparseAccumulator<K> {
    pub fn new() -> Self {
        Self {
            sums: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, key: K, value: f64) {
        *self.sums.entry(key).or_insert(0.0) += value;
    }

    /// Accumulated value for `key` (zero if nothing was added)
    pub fn get(&self, key: &K) -> f64 {
        self.sums.get(key).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.sums.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &f64)> {
        self.sums.iter()
    }

    /// Add every entry of another accumulator into this one
    pub fn merge(&mut self, other: &SparseAccumulator<K>) {
        for (key, value) in other.iter() {
            self.add(*key, *value);
        }
    }

    pub fn to_coo(&self) -> CooVector<K> {
        self.sums.iter().map(|(k, v)| (*k, *v)).collect()
    }
}

impl<K: Ord + Copy> Default for SparseAccumulator<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A sparse matrix paired with one weight per row
///
/// `M` typically holds area-weighted sums; dividing row `i` by `weight[i]` turns
/// those sums into area-weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSparse {
    #[serde(rename = "M")]
    pub m: SparseMatrix,
    pub weight: SparseVector,
}

impl WeightedSparse {
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            m: SparseMatrix::new(shape),
            weight: SparseVector::new(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.m.shape()
    }

    /// Append another weighted matrix of the same shape
    pub fn append(&mut self, other: &WeightedSparse) -> CouplingResult<()> {
        self.m.append(&other.m)?;
        self.weight.append(&other.weight);
        Ok(())
    }

    pub fn sum_duplicates(&mut self) {
        self.m.sum_duplicates();
        self.weight.sum_duplicates();
    }

    /// Per-row weights with duplicates summed
    pub fn weights(&self) -> SparseAccumulator<usize> {
        let mut weights = SparseAccumulator::new();
        for (row, w) in self.weight.iter() {
            weights.add(*row, *w);
        }
        weights
    }

    /// Rows holding entries whose total weight is zero, in ascending order
    ///
    /// Normalizing such a row divides by zero.
    pub fn zero_weight_rows(&self) -> Vec<usize> {
        let weights = self.weights();
        let rows: std::collections::BTreeSet<usize> = self
            .m
            .iter()
            .map(|e| e.row)
            .filter(|row| weights.get(row) == 0.0)
            .collect();
        rows.into_iter().collect()
    }

    /// The matrix with every row divided by its weight
    pub fn normalized(&self) -> SparseMatrix {
        let mut m = self.m.clone();
        m.divide_rows_by(&self.weights());
        m.sum_duplicates();
        m
    }
}
