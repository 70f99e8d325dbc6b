//! # py-keyed-limit
//!
//! `py-keyed-limit` a Python wrapper for `keyed-limit`.

use pyo3::prelude::*;

mod python;

#[pymodule]
fn py_keyed_limit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::init_python_module(m)?;
    Ok(())
}
