use rand::{distributions::Uniform, prelude::Distribution, Rng};
use std::mem;
use thiserror::Error;

use super::activation::Activation;
use super::config::{ConfigError, RpropConfig};
use super::trainer::Trainer;

/// Neural network structure
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    /// The number of neurons in each layer, input layer first.
    pub(super) geometry: Box<[usize]>,

    /// Activation function of all neurons.
    pub(super) activation: Activation,

    /// Array of coefficients (weights & biases).
    ///
    /// We will store all coefficients of all neurons of all layers here altogether:
    /// `coeffs = [layer_1][layer_2] ... [layer_N]`
    /// `layer = [neuron_1][neuron_2] ... [neuron_N]`
    /// `neuron = [weights]bias`
    /// So, `coeffs` will look like this:
    /// `[weights_1]bias_1[weights_2]bias_2 ...`
    pub(super) coeffs: Box<[f64]>,
}

impl Net {
    /// Returns network for given geometry.
    /// It will have random coefficients from range [-1,1].
    ///
    /// # Arguments
    /// * `geometry` - a number slice that holds a desired number of neurons in each layer;
    /// * `activation` - activation function of all neurons;
    /// * `coefficients` - slice of neurons coefficients (optional).
    ///
    /// # Returns
    /// * `Ok(Net)` if geometry and amount of coefficients are right, or no coefficients provided;
    /// * `Err(NewNetError)` otherwise.
    ///
    /// # Examples
    /// * Using random coefficients
    /// ```
    /// # use rpclassifier::feedforward::{Activation, Net};
    /// let net = Net::new(&[10, 20, 20, 3], Activation::Sigmoid { alpha: 2.0 }, None).unwrap();
    /// ```
    /// * Using given coefficients
    /// ```
    /// # use rpclassifier::feedforward::{Activation, Net};
    /// let coefficients = [0.27, 0.3, 7.5, 0.0, 1.1];
    /// let activation = Activation::BipolarSigmoid { alpha: 1.0 };
    /// let net = Net::new(&[2, 1, 1], activation, Some(Box::new(coefficients))).unwrap();
    /// ```
    pub fn new(
        geometry: &[usize],
        activation: Activation,
        coefficients: Option<Box<[f64]>>,
    ) -> Result<Net, NewNetError> {
        match coefficients {
            Some(coeffs) => Net::with_coefficients(geometry, activation, coeffs),
            None => Net::with_rng(geometry, activation, &mut rand::thread_rng()),
        }
    }

    /// Same as `Net::new` with random coefficients, but draws them from the given generator,
    /// so seeded generators give reproducible networks.
    pub fn with_rng<R: Rng + ?Sized>(
        geometry: &[usize],
        activation: Activation,
        rng: &mut R,
    ) -> Result<Net, NewNetError> {
        let coeffs_total = Net::check_geometry(geometry, activation)?;

        let coeffs_between = Uniform::from(-1.0..=1.0);
        let mut coeffs = Vec::with_capacity(coeffs_total);
        coeffs.extend((0..coeffs_total).map(|_| coeffs_between.sample(&mut *rng)));

        Ok(Net {
            geometry: geometry.to_owned().into_boxed_slice(),
            activation,
            coeffs: coeffs.into_boxed_slice(),
        })
    }

    fn with_coefficients(
        geometry: &[usize],
        activation: Activation,
        coeffs: Box<[f64]>,
    ) -> Result<Net, NewNetError> {
        let coeffs_total = Net::check_geometry(geometry, activation)?;
        if coeffs.len() != coeffs_total {
            return Err(NewNetError::BadCoefficients(SizeMismatch {
                expected: coeffs_total,
                got: coeffs.len(),
            }));
        }

        Ok(Net {
            geometry: geometry.to_owned().into_boxed_slice(),
            activation,
            coeffs,
        })
    }

    /// Validates geometry & activation, and returns the number of all coefficients
    /// (weights + biases) of all neurons in all layers.
    fn check_geometry(geometry: &[usize], activation: Activation) -> Result<usize, NewNetError> {
        if geometry.len() < 2 {
            return Err(NewNetError::BadGeometry(geometry.len()));
        }
        if let Some(layer) = geometry.iter().position(|&size| size == 0) {
            return Err(NewNetError::EmptyLayer(layer));
        }
        if !activation.is_valid() {
            return Err(NewNetError::BadAlpha(activation.alpha()));
        }

        geometry
            .windows(2)
            // Each of [layer_size] neurons has [old_layer_size] weights + 1 bias
            .try_fold(0usize, |total, pair| {
                pair[0]
                    .checked_add(1)
                    .and_then(|per_neuron| per_neuron.checked_mul(pair[1]))
                    .and_then(|layer| total.checked_add(layer))
            })
            .ok_or(NewNetError::TooLarge)
    }

    pub fn geometry(&self) -> &[usize] {
        &self.geometry
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn input_count(&self) -> usize {
        self.geometry[0]
    }

    pub fn output_count(&self) -> usize {
        self.geometry[self.geometry.len() - 1]
    }

    /// Number of trainable parameters (weights + biases).
    pub fn param_count(&self) -> usize {
        self.coeffs.len()
    }

    /// Exports geometry and coefficients from network.
    ///
    /// # Returns
    /// `(geometry, coefficients)`.
    pub fn export(&self) -> (&[usize], &[f64]) {
        (&self.geometry, &self.coeffs)
    }

    /// Neuron pre-activation.
    ///
    /// Implements the formula:
    /// `(prev_activations . weights) + bias`.
    ///
    /// `coeffs` must hold `size(prev_layer_activations)` weights followed by the bias.
    pub(super) fn weighted_sum(prev_layer_activations: &[f64], coeffs: &[f64]) -> f64 {
        debug_assert_eq!(coeffs.len(), prev_layer_activations.len() + 1);

        let (weights, bias) = coeffs.split_at(prev_layer_activations.len());
        prev_layer_activations
            .iter()
            .zip(weights.iter())
            .map(|(a, w)| a * w)
            .sum::<f64>()
            + bias[0]
    }

    /// Used in Net::process and Trainer::run_epoch for activations computing iterations.
    ///
    /// # Arguments
    /// * `activation` - activation function;
    /// * `old_layer_size` - mutable reference to `old_layer_size`;
    /// * `layer_size` - current layer size;
    /// * `remaining_coeffs` - mutable remaining coefficients slice;
    /// * `old_buffer` - slice of old activations buffer;
    /// * `buffer` - slice of current activations mutable buffer.
    pub(super) fn process_act_iteration(
        activation: Activation,
        old_layer_size: &mut usize,
        layer_size: usize,
        remaining_coeffs: &mut &[f64],
        old_buffer: &[f64],
        buffer: &mut [f64],
    ) {
        let mut rem_coeffs = *remaining_coeffs;

        // For each neuron in layer
        for neuron in buffer[..layer_size].iter_mut() {
            // Getting slice of current coeffs (weights + bias)
            let (current_coeffs, coeffs_tail) = rem_coeffs.split_at(*old_layer_size + 1);
            // And advancing forward
            rem_coeffs = coeffs_tail;

            *neuron =
                activation.apply(Net::weighted_sum(&old_buffer[..*old_layer_size], current_coeffs));
        }

        *old_layer_size = layer_size;
        *remaining_coeffs = rem_coeffs;
    }

    /// Calculates output of the network using given input.
    ///
    /// # Arguments
    /// * `inputs` - Slice that holds activations of input neurons;
    /// * `outputs` - Mutable slice that will be filled with activations of output neurons.
    ///
    /// # Returns
    /// * `Ok(())` if amount of inputs and size of the outputs are right;
    /// * `Err(ProcessError)` otherwise, leaving `outputs` untouched.
    pub fn process(&self, inputs: &[f64], outputs: &mut [f64]) -> Result<(), ProcessError> {
        let layers_count = self.geometry.len();

        if inputs.len() != self.geometry[0] {
            return Err(ProcessError::DimensionMismatch(SizeMismatch {
                expected: self.geometry[0],
                got: inputs.len(),
            }));
        }
        if outputs.len() != self.geometry[layers_count - 1] {
            return Err(ProcessError::BadOutputs(SizeMismatch {
                expected: self.geometry[layers_count - 1],
                got: outputs.len(),
            }));
        }

        let activation = self.activation;
        let mut remaining_coeffs = self.coeffs.as_ref();
        let (mut old_layer_size, layer_size) = (self.geometry[0], self.geometry[1]);

        if layers_count == 2 {
            // The only iteration: inputs -> outputs
            Net::process_act_iteration(
                activation,
                &mut old_layer_size,
                layer_size,
                &mut remaining_coeffs,
                inputs,
                outputs,
            );
            return Ok(());
        }

        // Hidden activations only need the previous layer, so two buffers of the biggest
        // hidden layer size are enough: `[old activations][new activations]`
        let max_layer_size = self.geometry[1..layers_count - 1]
            .iter()
            .copied()
            .max()
            .unwrap_or(0);
        let mut scratch = vec![0.0; max_layer_size * 2];
        let (mut old_buffer, mut buffer) = scratch.split_at_mut(max_layer_size);

        // First iteration: inputs -> old_buffer
        Net::process_act_iteration(
            activation,
            &mut old_layer_size,
            layer_size,
            &mut remaining_coeffs,
            inputs,
            old_buffer,
        );

        // Intermediate iterations: old_buffer -> buffer, then swap buffers
        for &layer_size in self.geometry[2..layers_count - 1].iter() {
            Net::process_act_iteration(
                activation,
                &mut old_layer_size,
                layer_size,
                &mut remaining_coeffs,
                old_buffer,
                buffer,
            );
            mem::swap(&mut buffer, &mut old_buffer);
        }

        // Last iteration: old_buffer -> outputs
        Net::process_act_iteration(
            activation,
            &mut old_layer_size,
            self.geometry[layers_count - 1],
            &mut remaining_coeffs,
            old_buffer,
            outputs,
        );
        Ok(())
    }

    /// Allocating version of `Net::process`.
    ///
    /// # Examples
    /// ```
    /// # use rpclassifier::feedforward::{Activation, Net};
    /// let net = Net::new(&[10, 20, 20, 3], Activation::Sigmoid { alpha: 2.0 }, None).unwrap();
    /// let outputs = net.compute(&[1.0; 10]).unwrap();
    /// assert_eq!(outputs.len(), 3);
    /// ```
    pub fn compute(&self, inputs: &[f64]) -> Result<Vec<f64>, ProcessError> {
        let mut outputs = vec![0.0; self.output_count()];
        self.process(inputs, &mut outputs)?;
        Ok(outputs)
    }

    /// Calculates cost function of an output values given the desired values.
    /// Implements the formula:
    /// `sum((outputs - desired outputs)^2)`
    ///
    /// # Returns
    /// * `Ok(f64)` if `outputs` and `desired_outputs` have the same size;
    /// * `SizeMismatch` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use rpclassifier::feedforward::Net;
    /// let outputs = [10.0; 1000];
    /// let desired_outputs = [10.25; 1000];
    /// let cost = Net::calc_cost(&outputs, &desired_outputs).unwrap();
    /// assert_eq!(cost, 62.5);
    /// ```
    pub fn calc_cost(outputs: &[f64], desired_outputs: &[f64]) -> Result<f64, SizeMismatch> {
        if outputs.len() != desired_outputs.len() {
            return Err(SizeMismatch {
                expected: outputs.len(),
                got: desired_outputs.len(),
            });
        };

        Ok(outputs
            .iter()
            .zip(desired_outputs.iter())
            .map(|(&a, &b)| (a - b) * (a - b))
            .sum())
    }

    /// Consumes `Net` and builds `Trainer` object containing it.
    /// See `Trainer`'s documentation for details.
    pub fn build_trainer(self, config: RpropConfig) -> Result<Trainer, ConfigError> {
        Trainer::build(self, config)
    }
}

/// Error structure for `Net::new`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NewNetError {
    #[error("Net must have at least two layers (input and output), but got geometry with len {0}!")]
    BadGeometry(usize),
    #[error("Layer {0} of the geometry has no neurons!")]
    EmptyLayer(usize),
    #[error(
        "Expected {} coefficients because of provided geometry, but got {}!",
        .0.expected,
        .0.got
    )]
    BadCoefficients(SizeMismatch),
    #[error("Activation slope must be finite and positive, but got {0}!")]
    BadAlpha(f64),
    #[error("Geometry needs more coefficients than can be addressed!")]
    TooLarge,
}

/// Error structure for `Net::process`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessError {
    #[error("Expected {} input(s), but got {}!", .0.expected, .0.got)]
    DimensionMismatch(SizeMismatch),
    #[error("Expected {} output(s), but got {}!", .0.expected, .0.got)]
    BadOutputs(SizeMismatch),
}

/// Error structure for collections size mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Expected {expected} values, but got {got}!")]
pub struct SizeMismatch {
    pub expected: usize,
    pub got: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    const SIGMOID: Activation = Activation::Sigmoid { alpha: 1.0 };

    #[test]
    fn rejects_bad_geometry() {
        assert_eq!(
            Net::new(&[3], SIGMOID, None),
            Err(NewNetError::BadGeometry(1))
        );
        assert_eq!(
            Net::new(&[3, 0, 2], SIGMOID, None),
            Err(NewNetError::EmptyLayer(1))
        );
        assert_eq!(
            Net::new(&[2, 1], SIGMOID, Some(Box::new([1.0, 2.0]))),
            Err(NewNetError::BadCoefficients(SizeMismatch {
                expected: 3,
                got: 2
            }))
        );
        assert_eq!(
            Net::new(&[2, 1], Activation::Sigmoid { alpha: 0.0 }, None),
            Err(NewNetError::BadAlpha(0.0))
        );
        assert_eq!(
            Net::new(&[usize::MAX, 2], SIGMOID, Some(Box::new([0.0; 0]))),
            Err(NewNetError::TooLarge)
        );
    }

    #[test]
    fn coefficient_layout() {
        let net = Net::new(&[4, 3, 2], SIGMOID, None).unwrap();
        // 3 * (4 + 1) + 2 * (3 + 1)
        assert_eq!(net.param_count(), 23);
        assert!(net.coefficients().iter().all(|c| (-1.0..=1.0).contains(c)));
    }

    #[test]
    fn biases_are_drawn_like_weights() {
        let net = Net::with_rng(&[4, 3, 2], SIGMOID, &mut StdRng::seed_from_u64(3)).unwrap();
        // Bias closes every neuron: 3 neurons of 5 coefficients, then 2 of 4
        let biases: Vec<f64> = [4, 9, 14, 18, 22]
            .iter()
            .map(|&i| net.coefficients()[i])
            .collect();
        assert!(biases.iter().all(|b| (-1.0..=1.0).contains(b)));
        assert!(biases.iter().any(|&b| b != 0.0));
    }

    #[test]
    fn single_layer_by_hand() {
        // Two neurons: weights [1, -1] bias 0.5 and weights [2, 0] bias -1
        let coeffs = [1.0, -1.0, 0.5, 2.0, 0.0, -1.0];
        let net = Net::new(&[2, 2], SIGMOID, Some(Box::new(coeffs))).unwrap();
        let outputs = net.compute(&[0.3, 0.8]).unwrap();

        assert_relative_eq!(outputs[0], 1.0 / (1.0 + (0.0f64).exp()));
        assert_relative_eq!(outputs[1], 1.0 / (1.0 + (0.4f64).exp()));
    }

    #[test]
    fn deep_network_by_hand() {
        let activation = Activation::BipolarSigmoid { alpha: 2.0 };
        // [1] -> [2] -> [1] -> [1]
        let coeffs = [0.5, 0.1, -0.3, 0.2, 1.0, -1.0, 0.0, 0.7, 0.05];
        let net = Net::new(&[1, 2, 1, 1], activation, Some(Box::new(coeffs))).unwrap();

        let x = 0.9;
        let h1 = activation.apply(0.5 * x + 0.1);
        let h2 = activation.apply(-0.3 * x + 0.2);
        let h3 = activation.apply(1.0 * h1 - 1.0 * h2 + 0.0);
        let y = activation.apply(0.7 * h3 + 0.05);

        assert_relative_eq!(net.compute(&[x]).unwrap()[0], y);
    }

    #[test]
    fn compute_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let net = Net::with_rng(&[5, 8, 6, 3], SIGMOID, &mut rng).unwrap();
        let inputs = [0.1, -0.4, 0.9, 0.0, 0.33];

        let first = net.compute(&inputs).unwrap();
        let second = net.compute(&inputs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn seeded_networks_are_reproducible() {
        let a = Net::with_rng(&[3, 4, 2], SIGMOID, &mut StdRng::seed_from_u64(11)).unwrap();
        let b = Net::with_rng(&[3, 4, 2], SIGMOID, &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_input_length_is_dimension_mismatch() {
        let net = Net::new(&[3, 4, 2], SIGMOID, None).unwrap();
        assert_eq!(
            net.compute(&[1.0, 2.0]),
            Err(ProcessError::DimensionMismatch(SizeMismatch {
                expected: 3,
                got: 2
            }))
        );

        let mut outputs = [7.0; 2];
        assert!(net.process(&[1.0; 4], &mut outputs).is_err());
        assert_eq!(outputs, [7.0; 2]);

        let mut outputs = [0.0; 3];
        assert_eq!(
            net.process(&[1.0; 3], &mut outputs),
            Err(ProcessError::BadOutputs(SizeMismatch {
                expected: 2,
                got: 3
            }))
        );
    }
}
