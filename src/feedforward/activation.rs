use serde::{Deserialize, Serialize};

/// Activation function shared by every neuron of a network.
///
/// `alpha` is the slope: it scales the neuron's weighted sum before the sigmoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activation {
    /// Logistic sigmoid.
    /// Implements the formula:
    /// `1 / (1 + exp(-alpha * x))`, output range is (0, 1).
    Sigmoid { alpha: f64 },

    /// Bipolar sigmoid.
    /// Implements the formula:
    /// `2 / (1 + exp(-alpha * x)) - 1`, output range is (-1, 1).
    BipolarSigmoid { alpha: f64 },
}

impl Activation {
    pub fn alpha(&self) -> f64 {
        match *self {
            Activation::Sigmoid { alpha } | Activation::BipolarSigmoid { alpha } => alpha,
        }
    }

    /// Slope must be finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        let alpha = self.alpha();
        alpha.is_finite() && alpha > 0.0
    }

    /// Applies the function to a neuron's pre-activation.
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Activation::Sigmoid { alpha } => 1.0 / (1.0 + (-alpha * x).exp()),
            Activation::BipolarSigmoid { alpha } => 2.0 / (1.0 + (-alpha * x).exp()) - 1.0,
        }
    }

    /// Derivative at the pre-activation `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        self.derivative_from_output(self.apply(x))
    }

    /// Derivative expressed in terms of the function's own output `y`,
    /// so the trainer can reuse activations cached during the forward pass.
    /// * Sigmoid: `alpha * y * (1 - y)`;
    /// * Bipolar sigmoid: `alpha * (1 - y^2) / 2`.
    pub fn derivative_from_output(&self, y: f64) -> f64 {
        match *self {
            Activation::Sigmoid { alpha } => alpha * y * (1.0 - y),
            Activation::BipolarSigmoid { alpha } => alpha * (1.0 - y * y) / 2.0,
        }
    }

    /// Builds an activation from its `name`, e.g. for command line or Python callers.
    pub fn from_name(name: &str, alpha: f64) -> Option<Activation> {
        match name {
            "sigmoid" => Some(Activation::Sigmoid { alpha }),
            "bipolar_sigmoid" => Some(Activation::BipolarSigmoid { alpha }),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Sigmoid { .. } => "sigmoid",
            Activation::BipolarSigmoid { .. } => "bipolar_sigmoid",
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Sigmoid { alpha: 2.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ranges_and_midpoints() {
        let sigmoid = Activation::Sigmoid { alpha: 1.0 };
        let bipolar = Activation::BipolarSigmoid { alpha: 1.0 };

        assert_relative_eq!(sigmoid.apply(0.0), 0.5);
        assert_relative_eq!(bipolar.apply(0.0), 0.0);

        for &x in &[-30.0, -2.5, 0.3, 7.0, 30.0] {
            let s = sigmoid.apply(x);
            let b = bipolar.apply(x);
            assert!((0.0..=1.0).contains(&s));
            assert!((-1.0..=1.0).contains(&b));
        }
    }

    #[test]
    fn alpha_scales_steepness() {
        let flat = Activation::Sigmoid { alpha: 0.5 };
        let steep = Activation::Sigmoid { alpha: 4.0 };
        assert!(steep.apply(1.0) > flat.apply(1.0));
        assert_relative_eq!(steep.apply(0.25), flat.apply(2.0));
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let h = 1e-6;
        for activation in &[
            Activation::Sigmoid { alpha: 0.5 },
            Activation::Sigmoid { alpha: 2.0 },
            Activation::BipolarSigmoid { alpha: 1.0 },
            Activation::BipolarSigmoid { alpha: 3.0 },
        ] {
            for &x in &[-2.0, -0.4, 0.0, 0.7, 1.9] {
                let numeric = (activation.apply(x + h) - activation.apply(x - h)) / (2.0 * h);
                assert_relative_eq!(activation.derivative(x), numeric, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn names() {
        let bipolar = Activation::BipolarSigmoid { alpha: 0.3 };
        assert_eq!(Activation::from_name(bipolar.name(), 0.3), Some(bipolar));
        assert_eq!(
            Activation::from_name("sigmoid", 1.5),
            Some(Activation::Sigmoid { alpha: 1.5 })
        );
        assert_eq!(Activation::from_name("tanh", 1.0), None);
    }

    #[test]
    fn slope_validation() {
        assert!(Activation::Sigmoid { alpha: 0.5 }.is_valid());
        assert!(!Activation::Sigmoid { alpha: 0.0 }.is_valid());
        assert!(!Activation::BipolarSigmoid { alpha: -1.0 }.is_valid());
        assert!(!Activation::BipolarSigmoid { alpha: f64::NAN }.is_valid());
    }
}
