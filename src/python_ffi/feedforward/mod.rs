pub mod net;
pub mod trainer;

use pyo3::{prelude::*, wrap_pymodule};

#[pymodule]
fn feedforward(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<net::Net>()?;
    m.add_class::<trainer::Trainer>()?;
    Ok(())
}

pub fn construct_module(m: &PyModule) -> PyResult<()> {
    m.add_wrapped(wrap_pymodule!(feedforward))?;
    Ok(())
}
