//! Multi-class classification with a fully connected feedforward network,
//! trained by full-batch resilient backpropagation (iRprop-).

pub mod classify;
pub mod feedforward;
pub mod samples;
pub mod training;

#[cfg(feature = "python")]
mod python_ffi;
