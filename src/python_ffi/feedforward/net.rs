use pyo3::{exceptions::PyValueError, prelude::*, types::PyBytes};

use super::trainer::{ConsumableTrainer, Trainer};
use crate::classify::classify;
use crate::feedforward::{
    model, Activation, ConfigError, ModelError, Net as InnerNet, NewNetError, ProcessError,
    RpropConfig, SizeMismatch,
};
use crate::{Impl_to_PyErr, MakeConsumable};

MakeConsumable!(ConsumableNet, InnerNet, Net);

#[pyclass]
pub struct Net {
    pub(super) net: ConsumableNet,
    pub(super) outputs_buffer: Box<[f64]>,
}

impl Net {
    pub(super) fn wrap(net: InnerNet) -> Self {
        let outputs_buffer = vec![0.0; net.output_count()].into_boxed_slice();
        Self {
            net: ConsumableNet::acquire(net),
            outputs_buffer,
        }
    }
}

#[pymethods]
impl Net {
    #[new]
    #[args(activation = "\"sigmoid\"", alpha = "2.0", coefficients = "None")]
    pub fn new(
        geometry: Vec<usize>,
        activation: &str,
        alpha: f64,
        coefficients: Option<Vec<f64>>,
    ) -> PyResult<Self> {
        let activation = Activation::from_name(activation, alpha).ok_or_else(|| {
            PyValueError::new_err(format!("Unknown activation function {:?}", activation))
        })?;
        let net = InnerNet::new(
            &geometry,
            activation,
            coefficients.map(Vec::into_boxed_slice),
        )?;
        Ok(Net::wrap(net))
    }

    pub fn geometry(&self) -> PyResult<Vec<usize>> {
        Ok(self.net.get_ref()?.geometry().to_vec())
    }

    /// Returns `(activation name, alpha)`.
    pub fn activation(&self) -> PyResult<(&'static str, f64)> {
        let activation = self.net.get_ref()?.activation();
        Ok((activation.name(), activation.alpha()))
    }

    pub fn export(&self) -> PyResult<(Vec<usize>, Vec<f64>)> {
        let (geometry, coeffs) = self.net.get_ref()?.export();
        Ok((geometry.to_owned(), coeffs.to_owned()))
    }

    pub fn compute(&mut self, inputs: Vec<f64>) -> PyResult<Vec<f64>> {
        self.net
            .get_ref()?
            .process(&inputs, &mut self.outputs_buffer)?;
        Ok(self.outputs_buffer.to_vec())
    }

    /// Index of the winning class for `inputs`.
    pub fn classify(&mut self, inputs: Vec<f64>) -> PyResult<Option<usize>> {
        self.net
            .get_ref()?
            .process(&inputs, &mut self.outputs_buffer)?;
        Ok(classify(&self.outputs_buffer))
    }

    pub fn save<'py>(&self, py: Python<'py>) -> PyResult<&'py PyBytes> {
        let bytes = model::save(self.net.get_ref()?)?;
        Ok(PyBytes::new(py, &bytes))
    }

    #[staticmethod]
    pub fn load(bytes: &[u8]) -> PyResult<Net> {
        Ok(Net::wrap(model::load(bytes)?))
    }

    #[args(initial_step = "None")]
    pub fn build_trainer(&mut self, initial_step: Option<f64>) -> PyResult<Trainer> {
        let mut config = RpropConfig::default();
        if let Some(initial_step) = initial_step {
            config.initial_step = initial_step;
        }
        config.validate()?;

        let trainer = self.net.release()?.build_trainer(config)?;
        Ok(Trainer {
            trainer: ConsumableTrainer::acquire(trainer),
            outputs_buffer: self.outputs_buffer.clone(),
        })
    }

    #[staticmethod]
    pub fn calc_cost(outputs: Vec<f64>, desired_outputs: Vec<f64>) -> PyResult<f64> {
        Ok(InnerNet::calc_cost(&outputs, &desired_outputs)?)
    }
}

Impl_to_PyErr!(for NewNetError, ProcessError, SizeMismatch, ConfigError, ModelError);
