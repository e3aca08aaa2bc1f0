//! Epoch loop around the Rprop trainer, with its stopping rule

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::feedforward::{ConfigError, TrainError, Trainer, TrainingConfig};
use crate::samples::SampleSet;

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Normalized error reached the threshold.
    Converged,
    /// The epoch bound was hit first.
    NonConvergence,
    /// Stopped from the outside between two epochs.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Done(Outcome),
}

/// Progress of one training run, passed to and returned from `TrainingLoop::step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingRun {
    /// Number of completed epochs.
    pub epoch: usize,
    /// Epoch error divided by the sample count, of the last completed epoch.
    pub error: Option<f64>,
    pub state: RunState,
}

impl TrainingRun {
    pub fn new() -> Self {
        TrainingRun {
            epoch: 0,
            error: None,
            state: RunState::Running,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state != RunState::Running
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.state {
            RunState::Running => None,
            RunState::Done(outcome) => Some(outcome),
        }
    }
}

impl Default for TrainingRun {
    fn default() -> Self {
        TrainingRun::new()
    }
}

/// Repeats Rprop epochs over a sample set until the normalized error drops to the
/// threshold, or until the optional epoch bound is reached.
#[derive(Debug, Clone)]
pub struct TrainingLoop {
    config: TrainingConfig,
}

impl TrainingLoop {
    pub fn new(config: TrainingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(TrainingLoop { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Runs a single epoch, unless `run` is already done.
    ///
    /// # Returns
    /// * `Ok(TrainingRun)` with the epoch counted and the state updated;
    /// * `Err(TrainError)` if the trainer rejects the samples.
    pub fn step(
        &self,
        trainer: &mut Trainer,
        samples: &SampleSet,
        mut run: TrainingRun,
    ) -> Result<TrainingRun, TrainError> {
        if run.is_done() {
            return Ok(run);
        }
        if self.bound_reached(run.epoch) {
            self.give_up(&mut run);
            return Ok(run);
        }

        let error = trainer.run_epoch(samples.inputs(), samples.outputs())? / samples.len() as f64;
        run.epoch += 1;
        run.error = Some(error);

        if error <= self.config.error_threshold {
            run.state = RunState::Done(Outcome::Converged);
            info!(epoch = run.epoch, error, "training converged");
        } else if self.bound_reached(run.epoch) {
            self.give_up(&mut run);
        } else if self.config.report_interval > 0 && run.epoch % self.config.report_interval == 0 {
            info!(epoch = run.epoch, error, "training");
        }

        Ok(run)
    }

    /// Trains until the run is done.
    pub fn run(&self, trainer: &mut Trainer, samples: &SampleSet) -> Result<TrainingRun, TrainError> {
        self.run_with(trainer, samples, None, |_| {})
    }

    /// Trains until the run is done or `cancel` is set, calling `on_epoch` after every epoch.
    pub fn run_with<F>(
        &self,
        trainer: &mut Trainer,
        samples: &SampleSet,
        cancel: Option<&AtomicBool>,
        mut on_epoch: F,
    ) -> Result<TrainingRun, TrainError>
    where
        F: FnMut(&TrainingRun),
    {
        debug!(
            geometry = ?trainer.net_ref().geometry(),
            samples = samples.len(),
            threshold = self.config.error_threshold,
            max_epochs = ?self.config.max_epochs,
            "starting training"
        );

        let mut run = TrainingRun::new();
        while !run.is_done() {
            if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                run.state = RunState::Done(Outcome::Cancelled);
                info!(epoch = run.epoch, "training cancelled");
                break;
            }
            run = self.step(trainer, samples, run)?;
            on_epoch(&run);
        }
        Ok(run)
    }

    fn give_up(&self, run: &mut TrainingRun) {
        run.state = RunState::Done(Outcome::NonConvergence);
        warn!(
            epoch = run.epoch,
            error = ?run.error,
            threshold = self.config.error_threshold,
            "epoch limit reached before convergence"
        );
    }

    fn bound_reached(&self, epoch: usize) -> bool {
        self.config.max_epochs.map_or(false, |max| epoch >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedforward::{Activation, Net, RpropConfig};
    use rand::{rngs::StdRng, SeedableRng};
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    /// Collects formatted log lines.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn logged<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, buffer.contents())
    }

    fn xor() -> SampleSet {
        SampleSet::from_labels(
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
            ],
            &[0, 1, 1, 0],
            2,
        )
        .unwrap()
    }

    fn trainer(geometry: &[usize], seed: u64) -> Trainer {
        let mut rng = StdRng::seed_from_u64(seed);
        Net::with_rng(geometry, Activation::Sigmoid { alpha: 2.0 }, &mut rng)
            .unwrap()
            .build_trainer(RpropConfig::default())
            .unwrap()
    }

    #[test]
    fn step_counts_epochs_and_keeps_error() {
        let training = TrainingLoop::new(TrainingConfig::default()).unwrap();
        let mut trainer = trainer(&[2, 2], 1);

        let run = training.step(&mut trainer, &xor(), TrainingRun::new()).unwrap();
        assert_eq!(run.epoch, 1);
        assert!(run.error.unwrap() > 0.0);
        assert_eq!(run.state, RunState::Running);
    }

    #[test]
    fn inseparable_data_hits_epoch_bound() {
        let config = TrainingConfig {
            max_epochs: Some(200),
            ..TrainingConfig::default()
        };
        let training = TrainingLoop::new(config).unwrap();
        // No hidden layer can't learn XOR
        let mut trainer = trainer(&[2, 2], 3);

        let mut epochs_seen = 0;
        let run = training
            .run_with(&mut trainer, &xor(), None, |_| epochs_seen += 1)
            .unwrap();
        assert_eq!(run.outcome(), Some(Outcome::NonConvergence));
        assert_eq!(run.epoch, 200);
        assert_eq!(epochs_seen, 200);
        assert!(run.error.unwrap() > 0.05);
    }

    #[test]
    fn zero_epoch_bound_trains_nothing() {
        let config = TrainingConfig {
            max_epochs: Some(0),
            ..TrainingConfig::default()
        };
        let training = TrainingLoop::new(config).unwrap();
        let mut trainer = trainer(&[2, 2], 3);
        let before = trainer.net_ref().clone();

        let run = training.run(&mut trainer, &xor()).unwrap();
        assert_eq!(run.outcome(), Some(Outcome::NonConvergence));
        assert_eq!(run.epoch, 0);
        assert_eq!(trainer.net_ref(), &before);
    }

    #[test]
    fn every_epoch_bound_stop_is_logged() {
        for &max_epochs in &[0, 3] {
            let training = TrainingLoop::new(TrainingConfig {
                max_epochs: Some(max_epochs),
                ..TrainingConfig::default()
            })
            .unwrap();
            let mut trainer = trainer(&[2, 2], 3);

            let (run, logs) = logged(|| training.run(&mut trainer, &xor()).unwrap());
            assert_eq!(run.outcome(), Some(Outcome::NonConvergence));
            assert_eq!(run.epoch, max_epochs);
            assert_eq!(logs.matches("epoch limit reached before convergence").count(), 1);
        }
    }

    #[test]
    fn done_run_is_not_stepped() {
        let training = TrainingLoop::new(TrainingConfig::default()).unwrap();
        let mut trainer = trainer(&[2, 2], 3);
        let done = TrainingRun {
            epoch: 5,
            error: Some(0.01),
            state: RunState::Done(Outcome::Converged),
        };
        assert_eq!(training.step(&mut trainer, &xor(), done).unwrap(), done);
    }

    #[test]
    fn cancellation_stops_between_epochs() {
        let training = TrainingLoop::new(TrainingConfig::default()).unwrap();
        let mut trainer = trainer(&[2, 2], 3);
        let cancel = AtomicBool::new(false);

        let run = training
            .run_with(&mut trainer, &xor(), Some(&cancel), |run| {
                if run.epoch == 10 {
                    cancel.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert_eq!(run.outcome(), Some(Outcome::Cancelled));
        assert_eq!(run.epoch, 10);
    }

    #[test]
    fn empty_samples_are_an_error() {
        let training = TrainingLoop::new(TrainingConfig::default()).unwrap();
        let mut trainer = trainer(&[2, 2], 3);
        let empty = SampleSet::from_labels(vec![], &[], 2).unwrap();

        assert_eq!(
            training.run(&mut trainer, &empty),
            Err(TrainError::EmptySampleSet)
        );
    }

    #[test]
    fn rejects_negative_threshold() {
        let config = TrainingConfig {
            error_threshold: -1.0,
            ..TrainingConfig::default()
        };
        assert!(TrainingLoop::new(config).is_err());
    }
}
