//! Training & validation samples, their one-hot class encoding and min-max normalization

mod loader;

pub use self::loader::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::classify;
use crate::feedforward::SizeMismatch;

/// A dataset split: input vectors with index-aligned one-hot desired outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    inputs: Vec<Vec<f64>>,
    outputs: Vec<Vec<f64>>,
    /// Class index of every sample, the position of the maximum of its output vector.
    actual_classes: Vec<usize>,
    input_count: usize,
    class_count: usize,
    /// Parameters this set was normalized with, if it was.
    normalization: Option<Normalization>,
}

impl SampleSet {
    /// Builds a sample set from already encoded outputs.
    ///
    /// All inputs must share one length, as must all outputs; outputs can't be empty.
    pub fn new(inputs: Vec<Vec<f64>>, outputs: Vec<Vec<f64>>) -> Result<SampleSet, SampleSetError> {
        if inputs.len() != outputs.len() {
            return Err(SampleSetError::SampleCountMismatch(SizeMismatch {
                expected: inputs.len(),
                got: outputs.len(),
            }));
        }

        let input_count = inputs.first().map_or(0, Vec::len);
        let class_count = outputs.first().map_or(0, Vec::len);

        let mut actual_classes = Vec::with_capacity(outputs.len());
        for (index, (i, o)) in inputs.iter().zip(outputs.iter()).enumerate() {
            if i.len() != input_count {
                return Err(SampleSetError::WrongSampleInputsCount {
                    index,
                    expected: input_count,
                    got: i.len(),
                });
            }
            if o.len() != class_count {
                return Err(SampleSetError::WrongSampleOutputsCount {
                    index,
                    expected: class_count,
                    got: o.len(),
                });
            }
            actual_classes.push(classify(o).ok_or(SampleSetError::NoClasses)?);
        }

        Ok(SampleSet {
            inputs,
            outputs,
            actual_classes,
            input_count,
            class_count,
            normalization: None,
        })
    }

    /// Builds a sample set from class indices, encoding each as a one-hot vector
    /// of `class_count` values (`1.0` for the class, `0.0` elsewhere).
    ///
    /// # Examples
    /// ```
    /// # use rpclassifier::samples::SampleSet;
    /// let set = SampleSet::from_labels(vec![vec![0.5], vec![2.0]], &[1, 0], 3).unwrap();
    /// assert_eq!(set.outputs()[0], vec![0.0, 1.0, 0.0]);
    /// assert_eq!(set.actual_classes(), &[1, 0]);
    /// ```
    pub fn from_labels(
        inputs: Vec<Vec<f64>>,
        labels: &[usize],
        class_count: usize,
    ) -> Result<SampleSet, SampleSetError> {
        if class_count == 0 {
            return Err(SampleSetError::NoClasses);
        }

        let mut outputs = Vec::with_capacity(labels.len());
        for (index, &label) in labels.iter().enumerate() {
            if label >= class_count {
                return Err(SampleSetError::LabelOutOfRange {
                    index,
                    label,
                    class_count,
                });
            }
            let mut one_hot = vec![0.0; class_count];
            one_hot[label] = 1.0;
            outputs.push(one_hot);
        }

        let mut set = SampleSet::new(inputs, outputs)?;
        // An empty set still knows how many classes it was meant for
        set.class_count = class_count;
        Ok(set)
    }

    pub fn inputs(&self) -> &[Vec<f64>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Vec<f64>] {
        &self.outputs
    }

    pub fn actual_classes(&self) -> &[usize] {
        &self.actual_classes
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn normalization(&self) -> Option<&Normalization> {
        self.normalization.as_ref()
    }

    /// Normalizes every input feature into `[0, 1]`.
    ///
    /// # Arguments
    /// * `reference` - parameters to apply. Training data passes `None`, so parameters are
    /// fitted on this set; validation data passes the training set's parameters.
    ///
    /// # Returns
    /// * `Ok(Normalization)` with the parameters in effect. A set is normalized only once:
    /// calling again with no reference or with the same parameters changes nothing;
    /// * `Err(SampleSetError)` if the set is empty, the reference has another feature count,
    /// or the set was already normalized with other parameters.
    pub fn normalize(
        &mut self,
        reference: Option<&Normalization>,
    ) -> Result<Normalization, SampleSetError> {
        if self.is_empty() {
            return Err(SampleSetError::EmptySampleSet);
        }

        if let Some(own) = &self.normalization {
            return match reference {
                Some(reference) if reference != own => Err(SampleSetError::AlreadyNormalized),
                _ => Ok(own.clone()),
            };
        }

        let params = match reference {
            Some(reference) => reference.clone(),
            None => Normalization::fit(&self.inputs)?,
        };
        if params.feature_count() != self.input_count {
            return Err(SampleSetError::DimensionMismatch(SizeMismatch {
                expected: self.input_count,
                got: params.feature_count(),
            }));
        }

        for inputs in self.inputs.iter_mut() {
            params.transform(inputs)?;
        }
        self.normalization = Some(params.clone());
        Ok(params)
    }
}

/// Per-feature minimum & maximum of the data the parameters were fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    mins: Vec<f64>,
    maxs: Vec<f64>,
}

impl Normalization {
    /// Computes parameters from the given input vectors.
    pub fn fit(inputs: &[Vec<f64>]) -> Result<Normalization, SampleSetError> {
        let first = inputs.first().ok_or(SampleSetError::EmptySampleSet)?;
        let mut mins = first.clone();
        let mut maxs = first.clone();

        for (index, sample) in inputs.iter().enumerate().skip(1) {
            if sample.len() != mins.len() {
                return Err(SampleSetError::WrongSampleInputsCount {
                    index,
                    expected: mins.len(),
                    got: sample.len(),
                });
            }
            for ((min, max), &x) in mins.iter_mut().zip(maxs.iter_mut()).zip(sample.iter()) {
                *min = min.min(x);
                *max = max.max(x);
            }
        }

        Ok(Normalization { mins, maxs })
    }

    pub fn feature_count(&self) -> usize {
        self.mins.len()
    }

    pub fn mins(&self) -> &[f64] {
        &self.mins
    }

    pub fn maxs(&self) -> &[f64] {
        &self.maxs
    }

    /// Maps every feature of `inputs` with `(x - min) / (max - min)`.
    /// Constant features (`max == min`) map to `0`.
    /// Values outside the fitted range land outside `[0, 1]`, they are not clamped.
    pub fn transform(&self, inputs: &mut [f64]) -> Result<(), SampleSetError> {
        if self.maxs.len() != self.mins.len() {
            return Err(SampleSetError::DimensionMismatch(SizeMismatch {
                expected: self.mins.len(),
                got: self.maxs.len(),
            }));
        }
        if inputs.len() != self.mins.len() {
            return Err(SampleSetError::DimensionMismatch(SizeMismatch {
                expected: self.mins.len(),
                got: inputs.len(),
            }));
        }

        for ((x, &min), &max) in inputs.iter_mut().zip(self.mins.iter()).zip(self.maxs.iter()) {
            let range = max - min;
            *x = if range > 0.0 { (*x - min) / range } else { 0.0 };
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleSetError {
    #[error("Sample set is empty!")]
    EmptySampleSet,
    #[error("Got {} input samples, but {} output samples!", .0.expected, .0.got)]
    SampleCountMismatch(SizeMismatch),
    #[error("Expected {expected} input(s), but samples[{index}] got {got}!")]
    WrongSampleInputsCount {
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("Expected {expected} output(s), but samples[{index}] got {got}!")]
    WrongSampleOutputsCount {
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("Samples must belong to at least one class!")]
    NoClasses,
    #[error("samples[{index}] has class {label}, but there are only {class_count} classes!")]
    LabelOutOfRange {
        index: usize,
        label: usize,
        class_count: usize,
    },
    #[error("Normalization expects {} feature(s), but got {}!", .0.expected, .0.got)]
    DimensionMismatch(SizeMismatch),
    #[error("Sample set is already normalized with different parameters!")]
    AlreadyNormalized,
}
