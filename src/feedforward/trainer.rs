use thiserror::Error;

use super::config::{ConfigError, RpropConfig};
use super::net::{Net, SizeMismatch};

/// Net trainer structure, implementing resilient backpropagation (iRprop-).
///
/// To train Net, additional buffers are needed. We will contain them in this structure.
/// Training procedure will look like this:
/// * One allocates additional buffers by calling `Net::build_trainer`, which will consume `Net`
/// and return `Trainer` object.
/// (Consuming `Net` is needed to prevent one from building another concurrent `Trainer`s.)
/// * Every call of `Trainer::run_epoch` accumulates the gradient over the whole training set
/// and then updates every weight & bias once.
/// Also, at any time one can call `Trainer::net_ref` to get access to `Net::compute`.
/// * Once finished training, one can use `Trainer::teardown` to free all the additional
/// buffers (step sizes & previous gradients included) and get `Net` object back.
pub struct Trainer {
    /// The network object trainer posesses.
    pub(crate) net: Net,

    pub(crate) config: RpropConfig,

    /// Since we will need to store activations of all layers for backpropagation, this is
    /// the buffer that will hold them (input layer excluded):
    /// `buffer = [layer_1][layer_2] ... [layer_N]`
    pub(crate) buffer: Box<[f64]>,

    /// Error signals of every neuron, same layout as `buffer`.
    pub(crate) deltas: Box<[f64]>,

    /// Offset of every layer (input layer excluded) in `buffer` and `deltas`.
    pub(crate) layer_offsets: Box<[usize]>,

    /// Offset of every layer (input layer excluded) in `Net::coeffs`.
    pub(crate) coeff_offsets: Box<[usize]>,

    /// Buffer with equivalent structure and size as `Net::coeffs`, that will hold
    /// the gradient accumulated over the current epoch.
    pub(crate) gradient_buffer: Box<[f64]>,

    /// Gradient of the previous epoch, zero where the last update saw a sign change.
    pub(crate) previous_gradients: Box<[f64]>,

    /// Per coefficient step size.
    pub(crate) update_values: Box<[f64]>,
}

impl Trainer {
    /// Consumes `Net` and builds `Trainer` object containing it.
    pub(super) fn build(net: Net, config: RpropConfig) -> Result<Trainer, ConfigError> {
        config.validate()?;

        let geometry = &net.geometry;
        let mut layer_offsets = Vec::with_capacity(geometry.len() - 1);
        let mut coeff_offsets = Vec::with_capacity(geometry.len() - 1);
        let (mut layer_offset, mut coeff_offset) = (0, 0);
        for pair in geometry.windows(2) {
            layer_offsets.push(layer_offset);
            coeff_offsets.push(coeff_offset);
            layer_offset += pair[1];
            coeff_offset += pair[1] * (pair[0] + 1);
        }

        let params = net.coeffs.len();
        Ok(Trainer {
            buffer: vec![0.0; layer_offset].into_boxed_slice(),
            deltas: vec![0.0; layer_offset].into_boxed_slice(),
            layer_offsets: layer_offsets.into_boxed_slice(),
            coeff_offsets: coeff_offsets.into_boxed_slice(),
            gradient_buffer: vec![0.0; params].into_boxed_slice(),
            previous_gradients: vec![0.0; params].into_boxed_slice(),
            update_values: vec![config.initial_step; params].into_boxed_slice(),
            net,
            config,
        })
    }

    /// Returns reference to contained `Net`, allowing the use of `Net::compute`.
    pub fn net_ref(&self) -> &Net {
        &self.net
    }

    pub fn config(&self) -> &RpropConfig {
        &self.config
    }

    /// Current step size of every coefficient, `Net::coeffs` layout.
    pub fn update_values(&self) -> &[f64] {
        &self.update_values
    }

    /// Gradients remembered from the last epoch, `Net::coeffs` layout.
    pub fn previous_gradients(&self) -> &[f64] {
        &self.previous_gradients
    }

    /// Adds a neuron's contribution to its gradient buffer.
    ///
    /// # Arguments
    /// * `coeff` - the neuron's error signal;
    /// * `gradbuf` - gradient buffer of the neuron (weights + bias);
    /// * `new_activations` - slice that holds activations feeding the neuron.
    fn update_gradbuf(coeff: f64, gradbuf: &mut [f64], new_activations: &[f64]) {
        for (gc, &na) in gradbuf[..new_activations.len()]
            .iter_mut()
            .zip(new_activations.iter())
        {
            *gc += coeff * na;
        }
        gradbuf[new_activations.len()] += coeff;
    }

    /// Forward pass over one sample, storing every layer's activations in `Trainer::buffer`.
    fn forward(&mut self, inputs: &[f64]) {
        let activation = self.net.activation;
        let geometry = &self.net.geometry;
        let mut remaining_coeffs = self.net.coeffs.as_ref();
        let mut old_layer_size = geometry[0];

        for (layer, &layer_size) in geometry[1..].iter().enumerate() {
            let offset = self.layer_offsets[layer];
            let (done, rest) = self.buffer.split_at_mut(offset);
            let old_buffer = if layer == 0 {
                inputs
            } else {
                &done[offset - old_layer_size..]
            };

            Net::process_act_iteration(
                activation,
                &mut old_layer_size,
                layer_size,
                &mut remaining_coeffs,
                old_buffer,
                rest,
            );
        }
    }

    /// Runs forward & backward passes for one sample, adding its gradient to
    /// `Trainer::gradient_buffer`. Sizes must be checked by the caller.
    ///
    /// # Returns
    /// * The cost function of resulting outputs and given `desired_outputs`.
    fn accumulate(&mut self, inputs: &[f64], desired_outputs: &[f64]) -> f64 {
        self.forward(inputs);

        let activation = self.net.activation;
        let geometry = &self.net.geometry;
        let coeffs = &self.net.coeffs;
        let layers = geometry.len() - 1;

        // Error signals of output layer
        let out_offset = self.layer_offsets[layers - 1];
        let outputs = &self.buffer[out_offset..];
        for ((d, &o), &d_o) in self.deltas[out_offset..]
            .iter_mut()
            .zip(outputs.iter())
            .zip(desired_outputs.iter())
        {
            *d = (o - d_o) * activation.derivative_from_output(o);
        }
        let cost = Net::calc_cost(outputs, desired_outputs).unwrap_or(0.0);

        // Error signals of hidden layers, from the last one backwards
        for layer in (0..layers - 1).rev() {
            let (size, next_size) = (geometry[layer + 1], geometry[layer + 2]);
            let offset = self.layer_offsets[layer];
            let next_coeffs = &coeffs[self.coeff_offsets[layer + 1]..];

            let (head, next_deltas) = self.deltas.split_at_mut(self.layer_offsets[layer + 1]);
            let next_deltas = &next_deltas[..next_size];

            for (i, d) in head[offset..offset + size].iter_mut().enumerate() {
                // Weight of connection i -> k is the i-th coefficient of neuron k
                let propagated: f64 = next_deltas
                    .iter()
                    .enumerate()
                    .map(|(k, &nd)| nd * next_coeffs[k * (size + 1) + i])
                    .sum();
                *d = propagated * activation.derivative_from_output(self.buffer[offset + i]);
            }
        }

        // Gradients: error signal of receiving neuron times output of sending neuron
        for layer in 0..layers {
            let (old_size, size) = (geometry[layer], geometry[layer + 1]);
            let new_activations = if layer == 0 {
                inputs
            } else {
                &self.buffer[self.layer_offsets[layer - 1]..self.layer_offsets[layer]]
            };
            let deltas = &self.deltas[self.layer_offsets[layer]..self.layer_offsets[layer] + size];
            let gradbuf = &mut self.gradient_buffer
                [self.coeff_offsets[layer]..self.coeff_offsets[layer] + size * (old_size + 1)];

            for (&der, current_gradbuf) in deltas.iter().zip(gradbuf.chunks_mut(old_size + 1)) {
                Trainer::update_gradbuf(der, current_gradbuf, new_activations);
            }
        }

        cost
    }

    /// Updates every coefficient using the sign of its current & previous gradients.
    fn apply_training(&mut self) {
        let config = self.config;

        for (((c, &g), prev), step) in self
            .net
            .coeffs
            .iter_mut()
            .zip(self.gradient_buffer.iter())
            .zip(self.previous_gradients.iter_mut())
            .zip(self.update_values.iter_mut())
        {
            let change = g * *prev;
            if change > 0.0 {
                *step = (*step * config.increase_factor).min(config.max_step);
                *c -= sign(g) * *step;
                *prev = g;
            } else if change < 0.0 {
                // Overshot a minimum: slow down, skip this update and forget the gradient
                *step = (*step * config.decrease_factor).max(config.min_step);
                *prev = 0.0;
            } else {
                *c -= sign(g) * *step;
                *prev = g;
            }
        }
    }

    /// Performs one epoch of full-batch training: accumulates gradients of all samples,
    /// then updates every coefficient once.
    ///
    /// # Arguments
    /// * `all_inputs` - inputs of all samples;
    /// * `all_desired_outputs` - desired outputs of all samples, index-aligned with inputs.
    ///
    /// # Returns
    /// * `Ok(f64)` with the sum of squared output errors over all samples;
    /// * `Err(TrainError)` if samples are missing or malformed. The net is left untouched then.
    ///
    /// # Examples
    /// ```
    /// # use rpclassifier::feedforward::{Activation, Net, RpropConfig};
    /// let net = Net::new(&[2, 3, 1], Activation::Sigmoid { alpha: 2.0 }, None).unwrap();
    /// let mut trainer = net.build_trainer(RpropConfig::default()).unwrap();
    /// let inputs = [[0.0, 0.0], [1.0, 1.0]];
    /// let desired_outputs = [[0.0], [1.0]];
    /// let error = trainer.run_epoch(&inputs, &desired_outputs).unwrap();
    /// assert!(error >= 0.0);
    /// ```
    pub fn run_epoch<I, O>(
        &mut self,
        all_inputs: &[I],
        all_desired_outputs: &[O],
    ) -> Result<f64, TrainError>
    where
        I: AsRef<[f64]>,
        O: AsRef<[f64]>,
    {
        if all_inputs.is_empty() {
            return Err(TrainError::EmptySampleSet);
        }
        if all_inputs.len() != all_desired_outputs.len() {
            return Err(TrainError::SampleCountMismatch(SizeMismatch {
                expected: all_inputs.len(),
                got: all_desired_outputs.len(),
            }));
        }

        let (inputs_len, outputs_len) = (self.net.input_count(), self.net.output_count());
        for (index, (inputs, desired_outputs)) in
            all_inputs.iter().zip(all_desired_outputs.iter()).enumerate()
        {
            let (inputs, desired_outputs) = (inputs.as_ref(), desired_outputs.as_ref());
            if inputs.len() != inputs_len {
                return Err(TrainError::WrongSampleInputsCount {
                    index,
                    expected: inputs_len,
                    got: inputs.len(),
                });
            }
            if desired_outputs.len() != outputs_len {
                return Err(TrainError::WrongSampleDesiredOutputsCount {
                    index,
                    expected: outputs_len,
                    got: desired_outputs.len(),
                });
            }
        }

        for g in self.gradient_buffer.iter_mut() {
            *g = 0.0;
        }

        let mut costs_sum = 0.0;
        for (inputs, desired_outputs) in all_inputs.iter().zip(all_desired_outputs.iter()) {
            costs_sum += self.accumulate(inputs.as_ref(), desired_outputs.as_ref());
        }

        self.apply_training();

        Ok(costs_sum)
    }

    /// Frees training buffers, consuming `Trainer` object, and returns contained `Net` back.
    pub fn teardown(self) -> Net {
        self.net
    }
}

/// Sign of `x`, zero for zero.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    #[error("Training requires at least one sample!")]
    EmptySampleSet,
    #[error(
        "Got {} input samples, but {} desired output samples!",
        .0.expected,
        .0.got
    )]
    SampleCountMismatch(SizeMismatch),
    #[error("Expected {expected} input(s), but samples[{index}] got {got}!")]
    WrongSampleInputsCount {
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("Expected {expected} desired output(s), but samples[{index}] got {got}!")]
    WrongSampleDesiredOutputsCount {
        index: usize,
        expected: usize,
        got: usize,
    },
}
