//! Python wrapper for the variable transformer.

use crate::python::contract::PyCouplingContract;
use crate::transformer::{Axis, VarTransformer};
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn parse_axis(axis: &str) -> PyResult<Axis> {
    match axis.to_ascii_uppercase().as_str() {
        "INPUTS" => Ok(Axis::Inputs),
        "OUTPUTS" => Ok(Axis::Outputs),
        "SCALARS" => Ok(Axis::Scalars),
        _ => Err(PyValueError::new_err(format!(
            "Unknown axis '{}', expected INPUTS, OUTPUTS or SCALARS",
            axis
        ))),
    }
}

#[pyclass(name = "VarTransformer", module = "icecoupler.core")]
#[derive(Clone, Default)]
pub struct PyVarTransformer(pub VarTransformer);

#[pymethods]
impl PyVarTransformer {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    fn set_names(&mut self, axis: &str, contract: &PyCouplingContract) -> PyResult<()> {
        Ok(self.0.set_names(parse_axis(axis)?, &contract.0)?)
    }

    fn allocate(&mut self) -> PyResult<()> {
        Ok(self.0.allocate()?)
    }

    fn set(&mut self, output: &str, input: &str, scalar: &str, value: f64) -> PyResult<()> {
        Ok(self.0.set(output, input, scalar, value)?)
    }

    fn coefficient(&self, output: &str, input: &str, scalar: &str) -> PyResult<f64> {
        Ok(self.0.coefficient(output, input, scalar)?)
    }

    /// Transform a single point
    fn apply<'py>(
        &self,
        py: Python<'py>,
        inputs: Vec<f64>,
        scalars: Vec<f64>,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.0.apply(&inputs, &scalars)?.into_pyarray_bound(py))
    }

    /// Transform an array with one row per point
    fn apply_rows<'py>(
        &self,
        py: Python<'py>,
        inputs: PyReadonlyArray2<'py, f64>,
        scalars: Vec<f64>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        Ok(self
            .0
            .apply_rows(inputs.as_array(), &scalars)?
            .into_pyarray_bound(py))
    }

    fn to_dict(&self, py: Python<'_>) -> PyResult<PyObject> {
        Ok(pythonize::pythonize(py, &self.0)?.into())
    }

    fn __str__(&self) -> String {
        self.0.to_string()
    }
}
