//! The training job: argument handling, cluster connection, training and
//! reporting, in that order.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use crate::cluster::ClusterBackend;
use crate::config::{self, Environment, RunConfig};
use crate::evaluation::EvalsResult;
use crate::matrix::DistributedMatrix;
use crate::notify::Notifier;
use crate::params::{ActorParams, BoosterParams, EvalMetric, TrainOptions};
use crate::parse;
use crate::report::{final_error_line, learning_rate_line, RunReport};
use crate::Error;

pub const USAGE: [&str; 2] = [
    "Command line argument not provided. Please provide a float value to be used as learning rate.",
    "Example: train 0.1",
];

pub const TRAIN_SPLIT: &str = "train";
pub const NUM_ACTORS: usize = 2;
pub const CPUS_PER_ACTOR: usize = 1;

#[derive(Parser, Debug, Clone)]
#[command(name = "train", version, about = "Train a gradient-boosted classifier on the cluster")]
pub struct Cli {
    /// Booster learning rate.
    #[arg(allow_negative_numbers = true)]
    pub learning_rate: Option<f64>,
    /// Arguments after the learning rate are ignored.
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,
    /// CSV file with `id, diagnosis, features...` rows, used instead of the
    /// built-in dataset.
    #[arg(long)]
    pub dataset: Option<PathBuf>,
    /// Directory the report file is written to.
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// No learning rate was given; usage was printed.
    Usage,
    Completed(RunReport),
}

/// Fixed parallelism for every run.
pub fn actor_params() -> ActorParams {
    ActorParams::new(NUM_ACTORS, CPUS_PER_ACTOR)
}

/// Connects `backend` unless it already holds a session. The cluster
/// endpoint is only read from `env` when a connection is needed.
pub fn ensure_connected<B, E>(backend: &mut B, env: &E) -> Result<(), Error>
where
    B: ClusterBackend + ?Sized,
    E: Environment,
{
    if backend.is_connected() {
        tracing::debug!("reusing existing cluster connection");
        return Ok(());
    }

    let address = config::cluster_address(env)?;
    tracing::info!(%address, "connecting to cluster");
    backend.connect(&address)?;
    Ok(())
}

pub fn run<B, E, W>(cli: &Cli, backend: &mut B, env: &E, out: &mut W) -> Result<Outcome, Error>
where
    B: ClusterBackend + ?Sized,
    E: Environment,
    W: Write,
{
    let Some(learning_rate) = cli.learning_rate else {
        for line in USAGE {
            writeln!(out, "{line}")?;
        }
        return Ok(Outcome::Usage);
    };
    writeln!(out, "{}", learning_rate_line(learning_rate))?;

    let config = RunConfig::from_env(env)?;
    ensure_connected(backend, env)?;

    if !cli.extra.is_empty() {
        tracing::debug!(ignored = ?cli.extra, "ignoring extra arguments");
    }
    let dataset = match &cli.dataset {
        Some(path) => parse::load(path)?,
        None => parse::builtin()?,
    };
    let train_set = DistributedMatrix::from_dataset(dataset)?;

    let params = BoosterParams::binary_logistic(learning_rate);
    let options = TrainOptions {
        verbose_eval: false,
        actors: actor_params(),
    };
    let mut evals_result = EvalsResult::new();
    let booster = backend.train(
        &params,
        &train_set,
        &[(&train_set, TRAIN_SPLIT)],
        &mut evals_result,
        &options,
    )?;
    tracing::debug!(rounds = booster.num_boosted_rounds(), "training finished");

    let metric = EvalMetric::Error.as_str();
    let final_error = evals_result
        .last(TRAIN_SPLIT, metric)
        .ok_or(Error::MissingMetric {
            split: TRAIN_SPLIT,
            metric,
        })?;
    writeln!(out, "{}", final_error_line(final_error))?;

    let report = RunReport {
        learning_rate,
        final_error,
    };
    report.write(&cli.output_dir, &config.user)?;

    if let Some(notify) = &config.notify {
        Notifier::new(notify).notify(final_error)?;
    }

    Ok(Outcome::Completed(report))
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn learning_rate_is_optional() {
        let cli = Cli::try_parse_from(["train"]).unwrap();
        assert_eq!(cli.learning_rate, None);
        assert_eq!(cli.dataset, None);
        assert_eq!(cli.output_dir, PathBuf::from("."));
    }

    #[test]
    fn parses_float_argument() {
        let cli = Cli::try_parse_from(["train", "0.1"]).unwrap();
        assert_eq!(cli.learning_rate, Some(0.1));
    }

    #[test]
    fn negative_learning_rate_is_accepted() {
        let cli = Cli::try_parse_from(["train", "-0.5"]).unwrap();
        assert_eq!(cli.learning_rate, Some(-0.5));
    }

    #[test]
    fn trailing_arguments_are_ignored() {
        let cli = Cli::try_parse_from(["train", "0.1", "extra", "--more"]).unwrap();
        assert_eq!(cli.learning_rate, Some(0.1));
        assert_eq!(cli.extra, vec!["extra".to_string(), "--more".to_string()]);
        assert_eq!(cli.dataset, None);
    }

    #[test]
    fn non_numeric_argument_fails_to_parse() {
        assert!(Cli::try_parse_from(["train", "fast"]).is_err());
    }

    #[test]
    fn fixed_parallelism() {
        assert_eq!(actor_params(), ActorParams::new(2, 1));
    }
}
