//! Python bindings, built with the `python` feature.
use crate::errors::CouplingError;
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

pub mod contract;
pub mod transformer;

pub use contract::{PyCoupledField, PyCouplingContract};
pub use transformer::PyVarTransformer;

impl From<CouplingError> for PyErr {
    fn from(err: CouplingError) -> PyErr {
        match err {
            CouplingError::UnknownField { .. } | CouplingError::UnknownConstant(_) => {
                PyKeyError::new_err(err.to_string())
            }
            CouplingError::InvalidState { .. } | CouplingError::IceModel { .. } => {
                PyRuntimeError::new_err(err.to_string())
            }
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

#[pymodule]
pub fn core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCoupledField>()?;
    m.add_class::<PyCouplingContract>()?;
    m.add_class::<PyVarTransformer>()?;
    Ok(())
}
