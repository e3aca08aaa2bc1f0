//! Turning network outputs into class decisions, and scoring a network on a sample set

use std::fmt;
use thiserror::Error;

use crate::feedforward::{Net, ProcessError, SizeMismatch};
use crate::samples::SampleSet;

/// Returns the index of the biggest score, or `None` for an empty slice.
///
/// When several scores share the maximum, the **last** of them wins.
/// NaN scores never win.
///
/// # Examples
/// ```
/// # use rpclassifier::classify::classify;
/// assert_eq!(classify(&[0.5, 0.9, 0.9]), Some(2));
/// ```
pub fn classify(outputs: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in outputs.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, best_score)) if score < best_score => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Fraction of samples in `[0, 1]` whose predicted class is the expected one.
///
/// A sample counts as a success when its expected output vector is strictly positive
/// at the index `classify` picks from the network's output.
pub fn validate(samples: &SampleSet, net: &Net) -> Result<f64, ValidateError> {
    if samples.is_empty() {
        return Err(ValidateError::EmptySampleSet);
    }
    if samples.class_count() != net.output_count() {
        return Err(ValidateError::ClassCountMismatch(SizeMismatch {
            expected: net.output_count(),
            got: samples.class_count(),
        }));
    }

    let mut outputs = vec![0.0; net.output_count()];
    let mut successes = 0usize;
    for (inputs, expected) in samples.inputs().iter().zip(samples.outputs().iter()) {
        net.process(inputs, &mut outputs)?;
        if let Some(predicted) = classify(&outputs) {
            if expected[predicted] > 0.0 {
                successes += 1;
            }
        }
    }

    Ok(successes as f64 / samples.len() as f64)
}

/// Per-class scores of one sample, printed one class per line as percentages.
///
/// Scores are the network's raw outputs, not probabilities: they need not sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    scores: Vec<f64>,
}

impl Classification {
    pub fn new(scores: Vec<f64>) -> Self {
        Classification { scores }
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn class(&self) -> Option<usize> {
        classify(&self.scores)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, score) in self.scores.iter().enumerate() {
            writeln!(f, "{}: {:.0}%", i, score * 100.0)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidateError {
    #[error("Can't validate on an empty sample set!")]
    EmptySampleSet,
    #[error("Net has {} output(s), but samples have {} classes!", .0.expected, .0.got)]
    ClassCountMismatch(SizeMismatch),
    #[error(transparent)]
    Process(#[from] ProcessError),
}
