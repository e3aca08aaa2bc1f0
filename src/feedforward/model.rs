//! Binary model format.
//!
//! A saved model is the `bincode` encoding (varint integers, little endian) of:
//! `magic ("RPNN") | version | activation tag | alpha | geometry | coefficients`.
//! Coefficients follow `Net::coeffs` layout, so the file is complete in layer order.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fs, io, path::Path};
use thiserror::Error;

use super::activation::Activation;
use super::net::{Net, NewNetError};

const MAGIC: [u8; 4] = *b"RPNN";
const VERSION: u16 = 1;

/// Biggest encoded model `load` accepts, in bytes.
pub const MAX_MODEL_SIZE: u64 = 1 << 30;

const SIGMOID_TAG: u8 = 0;
const BIPOLAR_SIGMOID_TAG: u8 = 1;

#[derive(Serialize, Deserialize)]
struct ModelSnapshot {
    magic: [u8; 4],
    version: u16,
    activation: u8,
    alpha: f64,
    geometry: Vec<u64>,
    coefficients: Vec<f64>,
}

/// Encodes the network: activation function & slope, geometry and every coefficient.
pub fn save(net: &Net) -> Result<Vec<u8>, ModelError> {
    let (tag, alpha) = match net.activation {
        Activation::Sigmoid { alpha } => (SIGMOID_TAG, alpha),
        Activation::BipolarSigmoid { alpha } => (BIPOLAR_SIGMOID_TAG, alpha),
    };
    let snapshot = ModelSnapshot {
        magic: MAGIC,
        version: VERSION,
        activation: tag,
        alpha,
        geometry: net.geometry.iter().map(|&size| size as u64).collect(),
        coefficients: net.coeffs.to_vec(),
    };

    bincode::options()
        .serialize(&snapshot)
        .map_err(ModelError::Encode)
}

/// Decodes a network saved by `save`.
///
/// Never builds a partial network: any undecodable, trailing, inconsistent or
/// non-finite data makes it fail with `ModelError::CorruptModel`.
pub fn load(bytes: &[u8]) -> Result<Net, ModelError> {
    load_limited(bytes, MAX_MODEL_SIZE)
}

fn load_limited(bytes: &[u8], limit: u64) -> Result<Net, ModelError> {
    let snapshot: ModelSnapshot = bincode::options()
        .with_limit(limit)
        .deserialize(bytes)
        .map_err(CorruptModel::Decode)?;

    if snapshot.magic != MAGIC {
        return Err(CorruptModel::BadMagic.into());
    }
    if snapshot.version != VERSION {
        return Err(CorruptModel::UnsupportedVersion(snapshot.version).into());
    }

    let alpha = snapshot.alpha;
    let activation = match snapshot.activation {
        SIGMOID_TAG => Activation::Sigmoid { alpha },
        BIPOLAR_SIGMOID_TAG => Activation::BipolarSigmoid { alpha },
        tag => return Err(CorruptModel::UnknownActivation(tag).into()),
    };

    let mut geometry = Vec::with_capacity(snapshot.geometry.len());
    for size in snapshot.geometry {
        let size = usize::try_from(size).map_err(|_| CorruptModel::LayerTooBig(size))?;
        geometry.push(size);
    }

    if let Some(index) = snapshot.coefficients.iter().position(|c| !c.is_finite()) {
        return Err(CorruptModel::NonFiniteCoefficient(index).into());
    }

    Net::new(
        &geometry,
        activation,
        Some(snapshot.coefficients.into_boxed_slice()),
    )
    .map_err(|err| CorruptModel::Inconsistent(err).into())
}

pub fn save_to_file<P: AsRef<Path>>(net: &Net, path: P) -> Result<(), ModelError> {
    fs::write(path, save(net)?)?;
    Ok(())
}

pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Net, ModelError> {
    load(&fs::read(path)?)
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to encode model: {0}")]
    Encode(bincode::Error),
    #[error("Corrupt model: {0}")]
    CorruptModel(#[from] CorruptModel),
    #[error("Model file I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Reason a model couldn't be loaded.
#[derive(Debug, Error)]
pub enum CorruptModel {
    #[error("undecodable data ({0})")]
    Decode(bincode::Error),
    #[error("not a model file")]
    BadMagic,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown activation function tag {0}")]
    UnknownActivation(u8),
    #[error("layer of {0} neurons doesn't fit this platform")]
    LayerTooBig(u64),
    #[error("coefficient {0} is not a finite number")]
    NonFiniteCoefficient(usize),
    #[error("{0}")]
    Inconsistent(NewNetError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn sample_net() -> Net {
        let mut rng = StdRng::seed_from_u64(5);
        Net::with_rng(&[3, 5, 2], Activation::BipolarSigmoid { alpha: 0.7 }, &mut rng).unwrap()
    }

    #[test]
    fn round_trip_keeps_everything() {
        let net = sample_net();
        let loaded = load(&save(&net).unwrap()).unwrap();
        assert_eq!(loaded, net);

        for probe in &[[0.0, 0.0, 0.0], [1.0, -1.0, 0.5], [0.3, 0.9, -0.2]] {
            let (a, b) = (net.compute(probe).unwrap(), loaded.compute(probe).unwrap());
            for (x, y) in a.iter().zip(b.iter()) {
                assert_relative_eq!(x, y, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn truncated_or_padded_bytes_are_corrupt() {
        let bytes = save(&sample_net()).unwrap();

        for len in &[0, 3, 10, bytes.len() - 1] {
            assert!(matches!(
                load(&bytes[..*len]),
                Err(ModelError::CorruptModel(CorruptModel::Decode(_)))
            ));
        }

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(
            load(&padded),
            Err(ModelError::CorruptModel(CorruptModel::Decode(_)))
        ));
    }

    fn encode(snapshot: &ModelSnapshot) -> Vec<u8> {
        bincode::options().serialize(snapshot).unwrap()
    }

    fn valid_snapshot() -> ModelSnapshot {
        ModelSnapshot {
            magic: MAGIC,
            version: VERSION,
            activation: SIGMOID_TAG,
            alpha: 1.0,
            geometry: vec![2, 1],
            coefficients: vec![0.5, -0.5, 0.1],
        }
    }

    #[test]
    fn rejects_inconsistent_contents() {
        assert!(load(&encode(&valid_snapshot())).is_ok());

        let bad_magic = ModelSnapshot {
            magic: *b"NOPE",
            ..valid_snapshot()
        };
        assert!(matches!(
            load(&encode(&bad_magic)),
            Err(ModelError::CorruptModel(CorruptModel::BadMagic))
        ));

        let bad_version = ModelSnapshot {
            version: 9,
            ..valid_snapshot()
        };
        assert!(matches!(
            load(&encode(&bad_version)),
            Err(ModelError::CorruptModel(CorruptModel::UnsupportedVersion(9)))
        ));

        let bad_activation = ModelSnapshot {
            activation: 7,
            ..valid_snapshot()
        };
        assert!(matches!(
            load(&encode(&bad_activation)),
            Err(ModelError::CorruptModel(CorruptModel::UnknownActivation(7)))
        ));

        let missing_coefficient = ModelSnapshot {
            coefficients: vec![0.5, -0.5],
            ..valid_snapshot()
        };
        assert!(matches!(
            load(&encode(&missing_coefficient)),
            Err(ModelError::CorruptModel(CorruptModel::Inconsistent(
                NewNetError::BadCoefficients(_)
            )))
        ));

        let nan = ModelSnapshot {
            coefficients: vec![0.5, f64::NAN, 0.1],
            ..valid_snapshot()
        };
        assert!(matches!(
            load(&encode(&nan)),
            Err(ModelError::CorruptModel(CorruptModel::NonFiniteCoefficient(1)))
        ));

        let bad_alpha = ModelSnapshot {
            alpha: -2.0,
            ..valid_snapshot()
        };
        assert!(matches!(
            load(&encode(&bad_alpha)),
            Err(ModelError::CorruptModel(CorruptModel::Inconsistent(
                NewNetError::BadAlpha(_)
            )))
        ));

        let overflowing = ModelSnapshot {
            geometry: vec![u64::MAX, u64::MAX],
            ..valid_snapshot()
        };
        assert!(matches!(
            load(&encode(&overflowing)),
            Err(ModelError::CorruptModel(_))
        ));
    }

    #[test]
    fn oversized_models_are_refused() {
        let bytes = save(&sample_net()).unwrap();
        assert!(load_limited(&bytes, bytes.len() as u64).is_ok());
        assert!(matches!(
            load_limited(&bytes, bytes.len() as u64 - 1),
            Err(ModelError::CorruptModel(CorruptModel::Decode(_)))
        ));
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "rpclassifier-model-{}.bin",
            std::process::id()
        ));
        let net = sample_net();

        save_to_file(&net, &path).unwrap();
        let loaded = load_from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(loaded, net);

        assert!(matches!(load_from_file(&path), Err(ModelError::Io(_))));
    }
}
