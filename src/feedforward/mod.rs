//! Feedforward neural network classifier with resilient backpropagation (Rprop) training

mod activation;
mod config;
pub mod model;
mod net;
mod trainer;

pub use self::activation::Activation;
pub use self::config::*;
pub use self::model::{CorruptModel, ModelError};
pub use self::net::*;
pub use self::trainer::*;
