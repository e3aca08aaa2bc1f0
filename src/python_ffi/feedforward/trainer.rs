use pyo3::prelude::*;

use super::net::Net;
use crate::feedforward::{TrainError, Trainer as InnerTrainer};
use crate::{Impl_to_PyErr, MakeConsumable};

MakeConsumable!(ConsumableTrainer, InnerTrainer, Trainer);

#[pyclass]
pub struct Trainer {
    pub(super) trainer: ConsumableTrainer,
    pub(super) outputs_buffer: Box<[f64]>,
}

#[pymethods]
impl Trainer {
    pub fn geometry(&self) -> PyResult<Vec<usize>> {
        Ok(self.trainer.get_ref()?.net_ref().geometry().to_vec())
    }

    pub fn export_net(&self) -> PyResult<(Vec<usize>, Vec<f64>)> {
        let (geometry, coeffs) = self.trainer.get_ref()?.net_ref().export();
        Ok((geometry.to_owned(), coeffs.to_owned()))
    }

    pub fn compute(&mut self, inputs: Vec<f64>) -> PyResult<Vec<f64>> {
        self.trainer
            .get_ref()?
            .net_ref()
            .process(&inputs, &mut self.outputs_buffer)?;
        Ok(self.outputs_buffer.to_vec())
    }

    /// One full-batch Rprop epoch. Returns the summed squared error of the epoch.
    pub fn run_epoch(
        &mut self,
        inputs: Vec<Vec<f64>>,
        desired_outputs: Vec<Vec<f64>>,
    ) -> PyResult<f64> {
        Ok(self
            .trainer
            .get_ref_mut()?
            .run_epoch(&inputs, &desired_outputs)?)
    }

    pub fn update_values(&self) -> PyResult<Vec<f64>> {
        Ok(self.trainer.get_ref()?.update_values().to_vec())
    }

    pub fn teardown(&mut self) -> PyResult<Net> {
        Ok(Net::wrap(self.trainer.release()?.teardown()))
    }
}

Impl_to_PyErr!(for TrainError);
