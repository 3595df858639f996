//! Linear transformation of one contract's values into another's.
//!
//! A [`VarTransformer`] holds a coefficient tensor indexed by
//! `(output, input, scalar)`. Its three axes are each bound to a contract:
//!
//! * `Inputs` - the contract the values come from,
//! * `Outputs` - the contract the values go to,
//! * `Scalars` - named run-time parameters (e.g. `by_dt`).
//!
//! The `"unit"` slot of the input and scalar axes is fixed at 1, so a
//! realized transform is
//!
//! ```text
//! out[o] = Σ_i Σ_s coeff[o, i, s] · in[i] · scalar[s]
//! ```
//!
//! which can express constant offsets (`unit × unit`), plain copies
//! (`input × unit`) and time-dependent scaling (`input × by_dt`).
//!
//! ```
//! use icecoupler_core::contract::{CouplingContract, FieldFlags};
//! use icecoupler_core::transformer::{Axis, VarTransformer};
//!
//! let mut gcm = CouplingContract::new();
//! gcm.add("litg", 0.0, "degC", FieldFlags::none(), "").unwrap();
//! let mut ice = CouplingContract::new();
//! ice.add("temperature", 273.15, "K", FieldFlags::none(), "").unwrap();
//!
//! let mut vt = VarTransformer::new();
//! vt.set_names(Axis::Inputs, &gcm).unwrap();
//! vt.set_names(Axis::Outputs, &ice).unwrap();
//! vt.set_names(Axis::Scalars, &CouplingContract::new()).unwrap();
//! vt.allocate().unwrap();
//! vt.set("temperature", "litg", "unit", 1.0).unwrap();
//! vt.set("temperature", "unit", "unit", 273.15).unwrap();
//!
//! let out = vt.apply(&[10.0], &[]).unwrap();
//! assert!((out[0] - 283.15).abs() < 1e-12);
//! ```

use crate::contract::{CouplingContract, UNIT};
use crate::errors::{CouplingError, CouplingResult};
use ndarray::{s, Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three named axes of the tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Inputs,
    Outputs,
    Scalars,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Inputs => "INPUTS",
            Axis::Outputs => "OUTPUTS",
            Axis::Scalars => "SCALARS",
        };
        write!(f, "{}", name)
    }
}

/// A single non-zero coefficient, by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub output: String,
    pub input: String,
    pub scalar: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VarTransformerData")]
pub struct VarTransformer {
    inputs: Option<CouplingContract>,
    outputs: Option<CouplingContract>,
    scalars: Option<CouplingContract>,
    tensor: Option<Array3<f64>>,
}

/// Serialised form of [`VarTransformer`]; the tensor must match the bound axes
#[derive(Deserialize)]
struct VarTransformerData {
    #[serde(default)]
    inputs: Option<CouplingContract>,
    #[serde(default)]
    outputs: Option<CouplingContract>,
    #[serde(default)]
    scalars: Option<CouplingContract>,
    #[serde(default)]
    tensor: Option<Array3<f64>>,
}

impl TryFrom<VarTransformerData> for VarTransformer {
    type Error = CouplingError;

    fn try_from(value: VarTransformerData) -> Result<Self, Self::Error> {
        let vt = VarTransformer {
            inputs: value.inputs,
            outputs: value.outputs,
            scalars: value.scalars,
            tensor: value.tensor,
        };
        if let Some(tensor) = &vt.tensor {
            let (n_out, n_in, n_sc) = tensor.dim();
            for (axis, expected, found) in [
                (Axis::Outputs, vt.contract(Axis::Outputs)?.size_without_unit(), n_out),
                (Axis::Inputs, vt.contract(Axis::Inputs)?.size_with_unit(), n_in),
                (Axis::Scalars, vt.contract(Axis::Scalars)?.size_with_unit(), n_sc),
            ] {
                if expected != found {
                    return Err(CouplingError::ShapeMismatch {
                        what: format!("transformer tensor {axis} axis"),
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(vt)
    }
}

impl VarTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, axis: Axis) -> &mut Option<CouplingContract> {
        match axis {
            Axis::Inputs => &mut self.inputs,
            Axis::Outputs => &mut self.outputs,
            Axis::Scalars => &mut self.scalars,
        }
    }

    /// Bind an axis to a contract. Each axis can only be bound once.
    pub fn set_names(&mut self, axis: Axis, contract: &CouplingContract) -> CouplingResult<()> {
        let slot = self.slot(axis);
        if slot.is_some() {
            return Err(CouplingError::AxisAlreadyBound(axis.to_string()));
        }
        *slot = Some(contract.clone());
        Ok(())
    }

    /// The contract bound to `axis`
    pub fn contract(&self, axis: Axis) -> CouplingResult<&CouplingContract> {
        let slot = match axis {
            Axis::Inputs => &self.inputs,
            Axis::Outputs => &self.outputs,
            Axis::Scalars => &self.scalars,
        };
        slot.as_ref()
            .ok_or_else(|| CouplingError::AxisUnbound(axis.to_string()))
    }

    /// Size the coefficient tensor, zero-filled.
    ///
    /// The input and scalar dimensions include their unit slot.
    pub fn allocate(&mut self) -> CouplingResult<()> {
        let shape = (
            self.contract(Axis::Outputs)?.size_without_unit(),
            self.contract(Axis::Inputs)?.size_with_unit(),
            self.contract(Axis::Scalars)?.size_with_unit(),
        );
        self.tensor = Some(Array3::zeros(shape));
        Ok(())
    }

    pub fn is_allocated(&self) -> bool {
        self.tensor.is_some()
    }

    fn tensor(&self) -> CouplingResult<&Array3<f64>> {
        self.tensor.as_ref().ok_or(CouplingError::NotAllocated)
    }

    fn resolve(&self, output: &str, input: &str, scalar: &str) -> CouplingResult<(usize, usize, usize)> {
        let lookup = |axis: Axis, name: &str, allow_unit: bool| -> CouplingResult<usize> {
            let contract = self.contract(axis)?;
            match contract.index(name) {
                Some(ix) if allow_unit || name != UNIT => Ok(ix),
                _ => Err(CouplingError::UnknownField {
                    context: format!("transformer {axis}"),
                    name: name.to_string(),
                }),
            }
        };
        Ok((
            lookup(Axis::Outputs, output, false)?,
            lookup(Axis::Inputs, input, true)?,
            lookup(Axis::Scalars, scalar, true)?,
        ))
    }

    /// Add `value` to the coefficient for `output += value · input · scalar`.
    ///
    /// Repeated calls for the same cell accumulate.
    pub fn set(&mut self, output: &str, input: &str, scalar: &str, value: f64) -> CouplingResult<()> {
        let ix = self.resolve(output, input, scalar)?;
        let tensor = self.tensor.as_mut().ok_or(CouplingError::NotAllocated)?;
        tensor[ix] += value;
        Ok(())
    }

    pub fn coefficient(&self, output: &str, input: &str, scalar: &str) -> CouplingResult<f64> {
        let ix = self.resolve(output, input, scalar)?;
        Ok(self.tensor()?[ix])
    }

    fn extend_with_unit(what: &str, values: &[f64], expected: usize) -> CouplingResult<Vec<f64>> {
        if values.len() != expected {
            return Err(CouplingError::ShapeMismatch {
                what: what.to_string(),
                expected,
                found: values.len(),
            });
        }
        let mut extended = values.to_vec();
        extended.push(1.0);
        Ok(extended)
    }

    /// Collapse the scalar axis, giving an `(outputs, inputs + 1)` matrix.
    ///
    /// The last column holds the constant terms.
    pub fn to_matrix(&self, scalars: &[f64]) -> CouplingResult<Array2<f64>> {
        let tensor = self.tensor()?;
        let scalars = Self::extend_with_unit(
            "scalars",
            scalars,
            self.contract(Axis::Scalars)?.size_without_unit(),
        )?;
        let (n_out, n_in, _) = tensor.dim();
        let mut matrix = Array2::zeros((n_out, n_in));
        for ((o, i, s), coeff) in tensor.indexed_iter() {
            if *coeff != 0.0 {
                matrix[[o, i]] += coeff * scalars[s];
            }
        }
        Ok(matrix)
    }

    /// Transform a single point.
    pub fn apply(&self, inputs: &[f64], scalars: &[f64]) -> CouplingResult<Vec<f64>> {
        let matrix = self.to_matrix(scalars)?;
        let inputs = Self::extend_with_unit(
            "inputs",
            inputs,
            self.contract(Axis::Inputs)?.size_without_unit(),
        )?;
        Ok(matrix
            .rows()
            .into_iter()
            .map(|row| row.iter().zip(&inputs).map(|(c, x)| c * x).sum())
            .collect())
    }

    /// Transform many points at once; `inputs` has one row per point.
    pub fn apply_rows(&self, inputs: ArrayView2<f64>, scalars: &[f64]) -> CouplingResult<Array2<f64>> {
        let matrix = self.to_matrix(scalars)?;
        let n_in = self.contract(Axis::Inputs)?.size_without_unit();
        if inputs.ncols() != n_in {
            return Err(CouplingError::ShapeMismatch {
                what: "input columns".to_string(),
                expected: n_in,
                found: inputs.ncols(),
            });
        }
        let mut out = inputs.dot(&matrix.slice(s![.., ..n_in]).t());
        out += &matrix.column(n_in);
        Ok(out)
    }

    /// Non-zero coefficients in (output, input, scalar) order
    pub fn terms(&self) -> CouplingResult<Vec<Term>> {
        let tensor = self.tensor()?;
        let name = |axis: Axis, ix: usize| -> CouplingResult<String> {
            let contract = self.contract(axis)?;
            contract
                .name(ix)
                .map(str::to_string)
                .ok_or_else(|| CouplingError::IndexOutOfBounds {
                    what: format!("transformer {axis}"),
                    index: ix,
                    extent: contract.size_with_unit(),
                })
        };

        let mut terms = Vec::new();
        for ((o, i, s), value) in tensor.indexed_iter() {
            if *value != 0.0 {
                terms.push(Term {
                    output: name(Axis::Outputs, o)?,
                    input: name(Axis::Inputs, i)?,
                    scalar: name(Axis::Scalars, s)?,
                    value: *value,
                });
            }
        }
        Ok(terms)
    }
}

impl fmt::Display for VarTransformer {
    /// Prints the recipe as one equation per output
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Ok(outputs), Ok(terms)) = (self.contract(Axis::Outputs), self.terms()) else {
            return write!(f, "<unallocated VarTransformer>");
        };
        for output in outputs.names() {
            let rhs: Vec<String> = terms
                .iter()
                .filter(|t| t.output == output)
                .map(|t| {
                    let factors: Vec<&str> = [t.input.as_str(), t.scalar.as_str()]
                        .into_iter()
                        .filter(|n| *n != UNIT)
                        .collect();
                    match (factors.is_empty(), t.value == 1.0) {
                        (true, _) => format!("{}", t.value),
                        (false, true) => factors.join("*"),
                        (false, false) => format!("{}*{}", t.value, factors.join("*")),
                    }
                })
                .collect();
            let rhs = if rhs.is_empty() {
                "0".to_string()
            } else {
                rhs.join(" + ")
            };
            writeln!(f, "{} = {}", output, rhs)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::FieldFlags;
    use is_close::is_close;
    use ndarray::array;

    fn contract(names: &[&str]) -> CouplingContract {
        let mut c = CouplingContract::new();
        for name in names {
            c.add(name, 0.0, "1", FieldFlags::none(), "").unwrap();
        }
        c
    }

    fn transformer(inputs: &[&str], outputs: &[&str], scalars: &[&str]) -> VarTransformer {
        let mut vt = VarTransformer::new();
        vt.set_names(Axis::Inputs, &contract(inputs)).unwrap();
        vt.set_names(Axis::Outputs, &contract(outputs)).unwrap();
        vt.set_names(Axis::Scalars, &contract(scalars)).unwrap();
        vt.allocate().unwrap();
        vt
    }

    #[test]
    fn test_unit_scalar_multiplies_by_one() {
        let mut vt = transformer(&["x"], &["y"], &[]);
        vt.set("y", "x", "unit", 2.0).unwrap();
        assert_eq!(vt.apply(&[5.0], &[]).unwrap(), vec![10.0]);
    }

    #[test]
    fn test_temperature_offset() {
        let mut gcm = CouplingContract::new();
        gcm.add("litg", 0.0, "degC", FieldFlags::none(), "").unwrap();
        let mut ice = CouplingContract::new();
        ice.add("mass_flux", 0.0, "kg m-2 s-1", FieldFlags::none(), "")
            .unwrap();
        ice.add("temperature", 273.15, "K", FieldFlags::none(), "")
            .unwrap();

        let mut vt = VarTransformer::new();
        vt.set_names(Axis::Inputs, &gcm).unwrap();
        vt.set_names(Axis::Outputs, &ice).unwrap();
        vt.set_names(Axis::Scalars, &CouplingContract::new()).unwrap();
        vt.allocate().unwrap();
        vt.set("temperature", "litg", "unit", 1.0).unwrap();
        vt.set("temperature", "unit", "unit", 273.15).unwrap();

        let out = vt.apply(&[10.0], &[]).unwrap();
        assert_eq!(out[0], 0.0);
        assert!(is_close!(out[1], 283.15));
    }

    #[test]
    fn test_linear_in_inputs() {
        let mut vt = transformer(&["a", "b"], &["y", "z"], &["by_dt"]);
        vt.set("y", "a", "unit", 3.0).unwrap();
        vt.set("y", "b", "by_dt", 0.5).unwrap();
        vt.set("z", "a", "by_dt", -1.0).unwrap();
        vt.set("z", "b", "unit", 2.0).unwrap();

        let scalars = [0.25];
        let x1 = [1.0, 2.0];
        let x2 = [-3.0, 7.0];
        let (alpha, beta) = (2.5, -0.5);
        let combined: Vec<f64> = x1
            .iter()
            .zip(&x2)
            .map(|(a, b)| alpha * a + beta * b)
            .collect();

        let y1 = vt.apply(&x1, &scalars).unwrap();
        let y2 = vt.apply(&x2, &scalars).unwrap();
        let y = vt.apply(&combined, &scalars).unwrap();
        for k in 0..2 {
            assert!(is_close!(y[k], alpha * y1[k] + beta * y2[k]));
        }
    }

    #[test]
    fn test_scalars_resolved_per_call() {
        let mut vt = transformer(&["mass"], &["rate"], &["by_dt"]);
        vt.set("rate", "mass", "by_dt", 1.0).unwrap();
        assert_eq!(vt.apply(&[10.0], &[0.5]).unwrap(), vec![5.0]);
        assert_eq!(vt.apply(&[10.0], &[0.1]).unwrap(), vec![1.0]);
    }

    #[test]
    fn test_set_accumulates() {
        let mut vt = transformer(&["x"], &["y"], &[]);
        vt.set("y", "x", "unit", 1.0).unwrap();
        vt.set("y", "x", "unit", -0.25).unwrap();
        assert_eq!(vt.coefficient("y", "x", "unit").unwrap(), 0.75);
    }

    #[test]
    fn test_apply_rows_matches_apply() {
        let mut vt = transformer(&["a", "b"], &["y"], &["s"]);
        vt.set("y", "a", "s", 2.0).unwrap();
        vt.set("y", "unit", "unit", 1.0).unwrap();
        vt.set("y", "b", "unit", -1.0).unwrap();

        let rows = array![[1.0, 1.0], [2.0, 0.0], [0.0, 3.0]];
        let out = vt.apply_rows(rows.view(), &[3.0]).unwrap();
        assert_eq!(out.dim(), (3, 1));
        for (row, expected) in rows.rows().into_iter().zip(out.column(0)) {
            let single = vt.apply(&row.to_vec(), &[3.0]).unwrap();
            assert!(is_close!(single[0], *expected));
        }
        assert_eq!(out[[0, 0]], 6.0);
    }

    #[test]
    fn test_unknown_names() {
        let mut vt = transformer(&["x"], &["y"], &[]);
        for (o, i, s) in [("nope", "x", "unit"), ("y", "nope", "unit"), ("y", "x", "nope"), ("unit", "x", "unit")] {
            assert!(matches!(
                vt.set(o, i, s, 1.0),
                Err(CouplingError::UnknownField { .. })
            ));
        }
    }

    #[test]
    fn test_axis_lifecycle() {
        let mut vt = VarTransformer::new();
        assert!(matches!(vt.allocate(), Err(CouplingError::AxisUnbound(_))));
        vt.set_names(Axis::Inputs, &contract(&["x"])).unwrap();
        assert!(matches!(
            vt.set_names(Axis::Inputs, &contract(&["x"])),
            Err(CouplingError::AxisAlreadyBound(_))
        ));
        vt.set_names(Axis::Outputs, &contract(&["y"])).unwrap();
        vt.set_names(Axis::Scalars, &contract(&[])).unwrap();
        assert!(matches!(
            vt.set("y", "x", "unit", 1.0),
            Err(CouplingError::NotAllocated)
        ));
        vt.allocate().unwrap();
        assert!(vt.set("y", "x", "unit", 1.0).is_ok());
    }

    #[test]
    fn test_shape_mismatch() {
        let vt = transformer(&["a", "b"], &["y"], &["s"]);
        assert!(matches!(
            vt.apply(&[1.0], &[1.0]),
            Err(CouplingError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            vt.apply(&[1.0, 2.0], &[]),
            Err(CouplingError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_display() {
        let mut vt = transformer(&["litg2"], &["surface_temperature", "other"], &[]);
        vt.set("surface_temperature", "litg2", "unit", 1.0).unwrap();
        vt.set("surface_temperature", "unit", "unit", 273.15).unwrap();
        let text = vt.to_string();
        assert_eq!(
            text,
            "surface_temperature = litg2 + 273.15\nother = 0\n"
        );
    }

    #[test]
    fn test_serialisation() {
        let mut vt = transformer(&["x", "w"], &["y"], &["by_dt"]);
        vt.set("y", "x", "by_dt", 2.0).unwrap();
        vt.set("y", "unit", "unit", -1.5).unwrap();

        let serialised = serde_json::to_string(&vt).unwrap();
        let restored: VarTransformer = serde_json::from_str(&serialised).unwrap();
        assert_eq!(restored, vt);
        assert_eq!(restored.terms().unwrap(), vt.terms().unwrap());
    }

    #[test]
    fn test_deserialise_checks_tensor() {
        let vt = transformer(&["x", "w"], &["y"], &["by_dt"]);
        let mut value = serde_json::to_value(&vt).unwrap();

        // One input too many: (1, 4, 2) against (1, 3, 2)
        let mut wide = VarTransformer::new();
        wide.set_names(Axis::Inputs, &contract(&["x", "w", "v"])).unwrap();
        wide.set_names(Axis::Outputs, &contract(&["y"])).unwrap();
        wide.set_names(Axis::Scalars, &contract(&["by_dt"])).unwrap();
        wide.allocate().unwrap();
        value["tensor"] = serde_json::to_value(&wide).unwrap()["tensor"].clone();
        let err = serde_json::from_value::<VarTransformer>(value.clone()).unwrap_err();
        assert!(err.to_string().contains("INPUTS"), "{err}");

        // A tensor with no contract bound to its axes
        value["scalars"] = serde_json::Value::Null;
        assert!(serde_json::from_value::<VarTransformer>(value).is_err());

        // Unallocated transformers need no tensor
        let mut unallocated = VarTransformer::new();
        unallocated.set_names(Axis::Inputs, &contract(&["x"])).unwrap();
        let text = serde_json::to_string(&unallocated).unwrap();
        let restored: VarTransformer = serde_json::from_str(&text).unwrap();
        assert!(!restored.is_allocated());
        assert!(restored.contract(Axis::Outputs).is_err());
    }
}
