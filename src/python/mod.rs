use icecoupler_core::config::CouplingConfig;
use icecoupler_core::python::core;
use icecoupler_models::MODEL_KINDS;
use pyo3::prelude::*;
use pyo3::wrap_pymodule;

/// Names accepted for `model` in an `[[ice_sheets]]` table
#[pyfunction]
fn model_kinds() -> Vec<&'static str> {
    MODEL_KINDS.to_vec()
}

/// Read and validate a TOML coupling configuration
#[pyfunction]
fn load_config(py: Python<'_>, path: &str) -> PyResult<PyObject> {
    let config = CouplingConfig::load(path)?;
    config.elevation_classes()?;
    Ok(pythonize::pythonize(py, &config)?.into())
}

#[pymodule]
#[pyo3(name = "_lib")]
fn icecoupler(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(model_kinds, m)?)?;
    m.add_function(wrap_pyfunction!(load_config, m)?)?;
    m.add_wrapped(wrap_pymodule!(core))?;

    set_path(m, "icecoupler._lib.core", "core")?;

    Ok(())
}

fn set_path(m: &Bound<'_, PyModule>, path: &str, module: &str) -> PyResult<()> {
    let code = format!(
        "\
import sys
sys.modules['{path}'] = {module}
    "
    );
    m.py().run_bound(&code, None, Some(&m.dict()))
}
