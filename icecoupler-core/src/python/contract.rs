//! Python wrappers for coupled fields and contracts.

use crate::contract::{CoupledField, CouplingContract, FieldFlags};
use pyo3::prelude::*;

#[pyclass(name = "CoupledField", module = "icecoupler.core")]
#[derive(Clone)]
pub struct PyCoupledField(pub CoupledField);

#[pymethods]
impl PyCoupledField {
    #[new]
    #[pyo3(signature = (name, default_value, units, flags="", description=""))]
    fn new(
        name: &str,
        default_value: f64,
        units: &str,
        flags: &str,
        description: &str,
    ) -> PyResult<Self> {
        let flags: FieldFlags = flags.parse()?;
        Ok(Self(
            CoupledField::new(name, default_value, units)
                .with_flags(flags)
                .with_description(description),
        ))
    }

    #[getter]
    fn name(&self) -> String {
        self.0.name.clone()
    }

    #[getter]
    fn default_value(&self) -> f64 {
        self.0.default_value
    }

    #[getter]
    fn units(&self) -> String {
        self.0.units.clone()
    }

    #[getter]
    fn flags(&self) -> String {
        self.0.flags.to_string()
    }

    #[getter]
    fn description(&self) -> String {
        self.0.description.clone()
    }

    fn __repr__(&self) -> String {
        format!("<CoupledField {}>", self.0)
    }
}

/// An ordered, named list of coupled fields
#[pyclass(name = "CouplingContract", module = "icecoupler.core")]
#[derive(Clone, Default)]
pub struct PyCouplingContract(pub CouplingContract);

#[pymethods]
impl PyCouplingContract {
    #[new]
    fn new() -> Self {
        Self::default()
    }

    #[pyo3(signature = (name, default_value, units, flags="", description=""))]
    fn add(
        &mut self,
        name: &str,
        default_value: f64,
        units: &str,
        flags: &str,
        description: &str,
    ) -> PyResult<usize> {
        Ok(self
            .0
            .add(name, default_value, units, flags.parse()?, description)?)
    }

    fn add_field(&mut self, field: PyCoupledField) -> PyResult<usize> {
        Ok(self.0.add_field(field.0)?)
    }

    /// Index of a field, or None if absent
    fn index(&self, name: &str) -> Option<usize> {
        self.0.index(name)
    }

    fn field(&self, ix: usize) -> Option<PyCoupledField> {
        self.0.field(ix).cloned().map(PyCoupledField)
    }

    fn names(&self) -> Vec<String> {
        self.0.names().into_iter().map(str::to_string).collect()
    }

    fn defaults(&self) -> Vec<f64> {
        self.0.defaults()
    }

    fn size_with_unit(&self) -> usize {
        self.0.size_with_unit()
    }

    fn size_without_unit(&self) -> usize {
        self.0.size_without_unit()
    }

    fn to_dict(&self, py: Python<'_>) -> PyResult<PyObject> {
        Ok(pythonize::pythonize(py, &self.0)?.into())
    }

    fn __len__(&self) -> usize {
        self.0.len()
    }

    fn __contains__(&self, name: &str) -> bool {
        self.0.field_by_name(name).is_some()
    }

    fn __repr__(&self) -> String {
        format!("<CouplingContract {:?}>", self.0.names())
    }
}
