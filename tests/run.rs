use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

use boost_train::app::{self, Cli, Outcome, USAGE};
use boost_train::booster::Booster;
use boost_train::cluster::{ClusterAddress, ClusterBackend, ClusterError, LocalCluster};
use boost_train::config::{CLUSTER_HOST_VAR, CLUSTER_PORT_VAR, USER_VAR};
use boost_train::evaluation::EvalsResult;
use boost_train::matrix::DistributedMatrix;
use boost_train::params::{ActorParams, BoosterParams, Objective, TrainOptions};
use boost_train::parse::DIMENSIONS;
use boost_train::report::RunReport;
use boost_train::Error;
use clap::Parser;
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct TrainCall {
    objective: &'static str,
    metrics: Vec<&'static str>,
    learning_rate: f64,
    actors: ActorParams,
    verbose_eval: bool,
    eval_names: Vec<String>,
    rows: usize,
}

/// Backend that records what it was asked to do and replays a fixed error history.
struct FakeBackend {
    connected: bool,
    connects: Vec<ClusterAddress>,
    errors: Vec<f64>,
    fail_training: bool,
    calls: RefCell<Vec<TrainCall>>,
}

impl FakeBackend {
    fn new(connected: bool, errors: &[f64]) -> Self {
        Self {
            connected,
            connects: Vec::new(),
            errors: errors.to_vec(),
            fail_training: false,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl ClusterBackend for FakeBackend {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self, address: &ClusterAddress) -> Result<(), ClusterError> {
        if self.connected {
            return Err(ClusterError::AlreadyConnected {
                address: address.clone(),
            });
        }
        self.connected = true;
        self.connects.push(address.clone());
        Ok(())
    }

    fn train(
        &self,
        params: &BoosterParams,
        dtrain: &DistributedMatrix,
        evals: &[(&DistributedMatrix, &str)],
        evals_result: &mut EvalsResult,
        options: &TrainOptions,
    ) -> Result<Booster, ClusterError> {
        self.calls.borrow_mut().push(TrainCall {
            objective: params.objective.as_str(),
            metrics: params.eval_metric.iter().map(|metric| metric.as_str()).collect(),
            learning_rate: params.learning_rate,
            actors: options.actors,
            verbose_eval: options.verbose_eval,
            eval_names: evals.iter().map(|(_, name)| (*name).to_string()).collect(),
            rows: dtrain.nrows(),
        });
        if self.fail_training {
            return Err(ClusterError::NotConnected);
        }
        for &error in &self.errors {
            evals_result.record("train", "logloss", error * 2.0);
            evals_result.record("train", "error", error);
        }
        Ok(Booster::new(Objective::BinaryLogistic, 0.0, Vec::new()))
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let workspace = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fs::create_dir(workspace.output_dir()).unwrap();
        write_dataset(&workspace.dataset(), 40);
        workspace
    }

    fn dataset(&self) -> PathBuf {
        self.dir.path().join("breast-cancer.csv")
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn cli(&self, learning_rate: Option<f64>) -> Cli {
        Cli {
            learning_rate,
            extra: Vec::new(),
            dataset: Some(self.dataset()),
            output_dir: self.output_dir(),
        }
    }

    fn reports(&self) -> Vec<String> {
        fs::read_dir(self.output_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }
}

/// Malignant rows have small feature values, benign rows large ones.
fn write_dataset(path: &Path, rows: usize) {
    let mut columns = vec!["id".to_string(), "diagnosis".to_string()];
    columns.extend((0..DIMENSIONS).map(|i| format!("feature_{i}")));
    let mut lines = vec![columns.join(",")];

    for row in 0..rows {
        let benign = row % 2 == 0;
        let mut fields = vec![
            (842_302 + row).to_string(),
            if benign { "B" } else { "M" }.to_string(),
        ];
        fields.extend((0..DIMENSIONS).map(|feature| {
            let base = if benign { 10.0 } else { 20.0 };
            format!("{:.3}", base + (row * 7 + feature) as f64 % 5.0)
        }));
        lines.push(fields.join(","));
    }

    fs::write(path, lines.join("\n")).unwrap();
}

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect()
}

fn run(
    cli: &Cli,
    backend: &mut FakeBackend,
    env: &HashMap<String, String>,
) -> (Result<Outcome, Error>, String) {
    let mut out = Vec::new();
    let result = app::run(cli, backend, env, &mut out);
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn missing_argument_prints_usage_and_does_nothing_else() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(false, &[0.1]);

    let (result, stdout) = run(&workspace.cli(None), &mut backend, &env(&[]));

    assert_eq!(result.unwrap(), Outcome::Usage);
    assert_eq!(stdout, format!("{}\n{}\n", USAGE[0], USAGE[1]));
    assert!(backend.connects.is_empty());
    assert!(backend.calls.borrow().is_empty());
    assert!(workspace.reports().is_empty());
}

#[test]
fn existing_connection_is_reused() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(true, &[0.1]);

    // no cluster variables: reading them would fail the run
    let (result, _) = run(
        &workspace.cli(Some(0.1)),
        &mut backend,
        &env(&[(USER_VAR, "ada")]),
    );

    assert!(matches!(result.unwrap(), Outcome::Completed(_)));
    assert!(backend.connects.is_empty());
    assert_eq!(backend.calls.borrow().len(), 1);
}

#[test]
fn connects_once_using_environment_endpoint() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(false, &[0.1]);
    let env = env(&[
        (USER_VAR, "ada"),
        (CLUSTER_HOST_VAR, "ray-head"),
        (CLUSTER_PORT_VAR, "10001"),
    ]);

    run(&workspace.cli(Some(0.1)), &mut backend, &env).0.unwrap();

    assert_eq!(backend.connects.len(), 1);
    assert_eq!(backend.connects[0].to_string(), "ray://ray-head:10001");
}

#[test]
fn missing_cluster_endpoint_is_fatal_when_not_connected() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(false, &[0.1]);

    let (result, _) = run(
        &workspace.cli(Some(0.1)),
        &mut backend,
        &env(&[(USER_VAR, "ada")]),
    );

    assert!(matches!(result, Err(Error::Config(_))));
    assert!(backend.calls.borrow().is_empty());
    assert!(workspace.reports().is_empty());
}

#[test]
fn report_file_matches_format_exactly() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(true, &[0.25, 0.1, 0.0732]);

    let (result, _) = run(
        &workspace.cli(Some(0.1)),
        &mut backend,
        &env(&[(USER_VAR, "ada")]),
    );

    assert_eq!(
        result.unwrap(),
        Outcome::Completed(RunReport {
            learning_rate: 0.1,
            final_error: 0.0732,
        })
    );
    let contents =
        fs::read_to_string(workspace.output_dir().join("ada_training_results.txt")).unwrap();
    assert_eq!(
        contents,
        "Learning rate used: 0.1000\nFinal training error: 0.0732"
    );
}

#[test]
fn stdout_lines_match_format_exactly() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(true, &[0.3, 0.12]);

    let (result, stdout) = run(
        &workspace.cli(Some(0.05)),
        &mut backend,
        &env(&[(USER_VAR, "ada")]),
    );

    result.unwrap();
    assert_eq!(
        stdout,
        "Using learning rate: 0.050\nFinal training error: 0.1200\n"
    );
}

#[test]
fn hyperparameters_are_fixed_apart_from_learning_rate() {
    for learning_rate in [0.3, 0.0, -1.0, 1e6] {
        let workspace = Workspace::new();
        let mut backend = FakeBackend::new(true, &[0.1]);

        run(
            &workspace.cli(Some(learning_rate)),
            &mut backend,
            &env(&[(USER_VAR, "ada")]),
        )
        .0
        .unwrap();

        let calls = backend.calls.borrow();
        let call = &calls[0];
        assert_eq!(call.objective, "binary:logistic");
        assert_eq!(call.metrics, vec!["logloss", "error"]);
        assert_eq!(call.actors, ActorParams::new(2, 1));
        assert!(!call.verbose_eval);
        assert_eq!(call.eval_names, vec!["train".to_string()]);
        assert_eq!(call.rows, 40);
        assert!((call.learning_rate - learning_rate).abs() < f64::EPSILON);
    }
}

#[test]
fn non_numeric_argument_is_rejected_before_running() {
    let err = Cli::try_parse_from(["train", "not-a-number"]).unwrap_err();
    assert_ne!(err.exit_code(), 0);
}

#[test]
fn report_name_derives_from_user() {
    for user in ["ada", "jane.doe", "svc_batch-7"] {
        let workspace = Workspace::new();
        let mut backend = FakeBackend::new(true, &[0.1]);

        run(
            &workspace.cli(Some(0.1)),
            &mut backend,
            &env(&[(USER_VAR, user)]),
        )
        .0
        .unwrap();

        assert_eq!(
            workspace.reports(),
            vec![format!("{user}_training_results.txt")]
        );
    }
}

#[test]
fn failed_training_writes_no_report() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(true, &[0.1]);
    backend.fail_training = true;

    let (result, stdout) = run(
        &workspace.cli(Some(0.1)),
        &mut backend,
        &env(&[(USER_VAR, "ada")]),
    );

    assert!(matches!(result, Err(Error::Cluster(_))));
    assert_eq!(stdout, "Using learning rate: 0.100\n");
    assert!(workspace.reports().is_empty());
}

#[test]
fn missing_error_history_is_reported() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(true, &[]);

    let (result, _) = run(
        &workspace.cli(Some(0.1)),
        &mut backend,
        &env(&[(USER_VAR, "ada")]),
    );

    assert!(matches!(result, Err(Error::MissingMetric { .. })));
    assert!(workspace.reports().is_empty());
}

#[test]
fn builtin_dataset_is_used_without_override() {
    let workspace = Workspace::new();
    let mut backend = FakeBackend::new(true, &[0.05]);
    let cli = Cli {
        dataset: None,
        ..workspace.cli(Some(0.1))
    };

    let (result, _) = run(&cli, &mut backend, &env(&[(USER_VAR, "ada")]));

    assert!(matches!(result.unwrap(), Outcome::Completed(_)));
    assert_eq!(backend.calls.borrow()[0].rows, 569);
    assert_eq!(
        workspace.reports(),
        vec!["ada_training_results.txt".to_string()]
    );
}

#[test]
fn missing_dataset_is_fatal() {
    let workspace = Workspace::new();
    fs::remove_file(workspace.dataset()).unwrap();
    let mut backend = FakeBackend::new(true, &[0.1]);

    let (result, _) = run(
        &workspace.cli(Some(0.1)),
        &mut backend,
        &env(&[(USER_VAR, "ada")]),
    );

    assert!(matches!(result, Err(Error::Dataset(_))));
}

#[test]
fn local_cluster_trains_end_to_end() {
    let workspace = Workspace::new();
    let head = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = head.local_addr().unwrap().port().to_string();
    let env = env(&[
        (USER_VAR, "ada"),
        (CLUSTER_HOST_VAR, "127.0.0.1"),
        (CLUSTER_PORT_VAR, port.as_str()),
    ]);

    let mut cluster = LocalCluster::new();
    let mut out = Vec::new();
    let outcome = app::run(&workspace.cli(Some(0.3)), &mut cluster, &env, &mut out).unwrap();

    let Outcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert!(cluster.is_connected());
    assert!(report.final_error < 1e-9);

    let stdout = String::from_utf8(out).unwrap();
    assert_eq!(
        stdout,
        "Using learning rate: 0.300\nFinal training error: 0.0000\n"
    );
    assert_eq!(
        fs::read_to_string(workspace.output_dir().join("ada_training_results.txt")).unwrap(),
        "Learning rate used: 0.3000\nFinal training error: 0.0000"
    );
}
