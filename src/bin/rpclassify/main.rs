mod app_config;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use std::{fs, path::PathBuf};
use tracing::{info, subscriber::SetGlobalDefaultError, warn};
use tracing_subscriber::EnvFilter;

use app_config::{run_name, AppConfig, RpropSettings};
use rpclassifier::{
    classify::{validate, Classification},
    feedforward::{model, Activation, Net},
    samples::{load_csv, load_features, CsvOptions, Normalization, SampleSet},
    training::{Outcome, TrainingLoop, TrainingRun},
};

#[derive(Parser)]
#[command(version, about = "Feedforward network classifier trained with resilient backpropagation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a network on a CSV split and validate it on another
    Train(TrainArgs),
    /// Classify every row of a CSV file with a saved network
    Classify(ClassifyArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// Training samples, class index in the last column
    #[arg(long, value_name = "PATH")]
    train: PathBuf,
    /// Validation samples, same layout as the training ones
    #[arg(long, value_name = "PATH")]
    test: PathBuf,
    /// YAML file with training settings
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Hidden layer sizes, e.g. 100,50
    #[arg(long, value_delimiter = ',', value_name = "SIZES")]
    hidden: Option<Vec<usize>>,
    /// Activation slope
    #[arg(long)]
    alpha: Option<f64>,
    /// Initial Rprop update value
    #[arg(long)]
    initial_step: Option<f64>,
    #[arg(long)]
    error_threshold: Option<f64>,
    /// Epoch bound, 0 trains until convergence
    #[arg(long)]
    max_epochs: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// Where to save the trained network
    #[arg(long, value_name = "PATH", default_value = "network.bin")]
    model: PathBuf,
    /// Where to save the training normalization parameters (YAML)
    #[arg(long, value_name = "PATH")]
    norm: Option<PathBuf>,
    #[command(flatten)]
    csv: CsvArgs,
}

#[derive(Args)]
struct ClassifyArgs {
    #[arg(long, value_name = "PATH")]
    model: PathBuf,
    /// Feature rows without a class column
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Normalization parameters saved by `train --norm`
    #[arg(long, value_name = "PATH")]
    norm: Option<PathBuf>,
    #[command(flatten)]
    csv: CsvArgs,
}

#[derive(Args)]
struct CsvArgs {
    /// First row of every CSV file is a header
    #[arg(long)]
    has_headers: bool,
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(format!("expected a single byte delimiter, got {:?}", s)),
    }
}

fn install_logger() -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

fn main() -> anyhow::Result<()> {
    install_logger()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => {
            let run = train(&args)?;
            match run.outcome() {
                Some(Outcome::Converged) => Ok(()),
                outcome => bail!(
                    "Training ended with {:?} after {} epochs, the model was saved anyway",
                    outcome,
                    run.epoch
                ),
            }
        }
        Command::Classify(args) => classify_file(args),
    }
}

impl TrainArgs {
    /// Flag values on top of `base`. `--alpha` keeps the configured activation kind.
    fn overrides(&self, base: &AppConfig) -> AppConfig {
        AppConfig {
            hidden: self.hidden.clone(),
            activation: self.alpha.map(|alpha| match base.activation() {
                Activation::Sigmoid { .. } => Activation::Sigmoid { alpha },
                Activation::BipolarSigmoid { .. } => Activation::BipolarSigmoid { alpha },
            }),
            rprop: RpropSettings {
                initial_step: self.initial_step,
                ..RpropSettings::default()
            },
            error_threshold: self.error_threshold,
            max_epochs: self.max_epochs,
            report_interval: None,
            seed: self.seed,
        }
    }
}

/// Trains, validates and saves the network, whether or not training converged.
fn train(args: &TrainArgs) -> anyhow::Result<TrainingRun> {
    let file_config = match &args.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => AppConfig::default(),
    };
    let overrides = args.overrides(&file_config);
    let config = file_config.merge(overrides);

    let csv = CsvOptions {
        has_headers: args.csv.has_headers,
        delimiter: args.csv.delimiter,
        ..CsvOptions::default()
    };
    let mut training_data = load_csv(&args.train, &csv)
        .with_context(|| format!("Failed to load {}", args.train.display()))?;
    let normalization = training_data.normalize(None)?;

    let test_csv = CsvOptions {
        class_count: Some(training_data.class_count()),
        ..csv
    };
    let mut validation_data = load_csv(&args.test, &test_csv)
        .with_context(|| format!("Failed to load {}", args.test.display()))?;
    validation_data.normalize(Some(&normalization))?;

    let mut geometry = vec![training_data.input_count()];
    geometry.extend(config.hidden());
    geometry.push(training_data.class_count());

    let activation = config.activation();
    let rprop = config.rprop();
    let net = match config.seed {
        Some(seed) => Net::with_rng(&geometry, activation, &mut StdRng::seed_from_u64(seed))?,
        None => Net::new(&geometry, activation, None)?,
    };
    let mut trainer = net.build_trainer(rprop)?;
    let training = TrainingLoop::new(config.training())?;

    let name = run_name(&geometry, &rprop, &activation);
    info!("Starting to train a network: {}", name);
    let run = training.run(&mut trainer, &training_data)?;
    let net = trainer.teardown();

    match run.outcome() {
        Some(Outcome::Converged) => info!(
            epoch = run.epoch,
            error = ?run.error,
            "DONE {}",
            name
        ),
        outcome => warn!(
            epoch = run.epoch,
            error = ?run.error,
            outcome = ?outcome,
            "{} did not converge, keeping the network as it is",
            name
        ),
    }

    println!("Validating on training data for {}", name);
    print_success_rate(&training_data, &net)?;
    println!("Validating on testing data for {}", name);
    print_success_rate(&validation_data, &net)?;

    model::save_to_file(&net, &args.model)
        .with_context(|| format!("Failed to save {}", args.model.display()))?;
    if let Some(path) = &args.norm {
        fs::write(path, serde_yaml::to_string(&normalization)?)
            .with_context(|| format!("Failed to save {}", path.display()))?;
    }

    println!("------------------------------------------");
    println!("Use trained and saved network to classify data:");
    let loaded = model::load_from_file(&args.model)?;
    let example = &validation_data.inputs()[0];
    let result = loaded.compute(example)?;
    let output: Vec<String> = result.iter().map(f64::to_string).collect();
    println!("Output vector = [{}]", output.join(", "));
    println!("Output class probabilities:");
    print!("{}", Classification::new(result));
    println!(
        "Actual example class is: {}",
        validation_data.actual_classes()[0]
    );

    Ok(run)
}

fn print_success_rate(samples: &SampleSet, net: &Net) -> anyhow::Result<()> {
    let rate = validate(samples, net)?;
    println!("Success rate is: {:.2}%", rate * 100.0);
    Ok(())
}

fn classify_file(args: ClassifyArgs) -> anyhow::Result<()> {
    let net = model::load_from_file(&args.model)
        .with_context(|| format!("Failed to load {}", args.model.display()))?;
    let normalization: Option<Normalization> = match &args.norm {
        Some(path) => Some(serde_yaml::from_str(
            &fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        )?),
        None => None,
    };

    let rows = load_features(&args.input, args.csv.has_headers, args.csv.delimiter)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    for (row, mut inputs) in rows.into_iter().enumerate() {
        if let Some(normalization) = &normalization {
            normalization.transform(&mut inputs)?;
        }
        let result = Classification::new(
            net.compute(&inputs)
                .with_context(|| format!("Row {}", row + 1))?,
        );
        match result.class() {
            Some(class) => println!("{}", class),
            None => println!("-"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, process};

    fn csv_args() -> CsvArgs {
        CsvArgs {
            has_headers: false,
            delimiter: b',',
        }
    }

    #[test]
    fn unconverged_network_is_still_saved() {
        let dir = env::temp_dir();
        let data = dir.join(format!("rpclassify-xor-{}.csv", process::id()));
        let model_path = dir.join(format!("rpclassify-xor-{}.bin", process::id()));
        fs::write(&data, "0,0,0\n0,1,1\n1,0,1\n1,1,0\n").unwrap();

        // No hidden layer can't learn XOR
        let args = TrainArgs {
            train: data.clone(),
            test: data.clone(),
            config: None,
            hidden: Some(vec![]),
            alpha: None,
            initial_step: None,
            error_threshold: None,
            max_epochs: Some(50),
            seed: Some(1),
            model: model_path.clone(),
            norm: None,
            csv: csv_args(),
        };
        let run = train(&args).unwrap();
        assert_eq!(run.outcome(), Some(Outcome::NonConvergence));
        assert_eq!(run.epoch, 50);

        let saved = model::load_from_file(&model_path).unwrap();
        assert_eq!(saved.geometry(), &[2, 2]);

        fs::remove_file(&data).unwrap();
        fs::remove_file(&model_path).unwrap();
    }
}
