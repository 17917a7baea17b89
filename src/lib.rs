pub mod app;
pub mod booster;
pub mod boosting;
pub mod cluster;
pub mod config;
pub mod evaluation;
pub mod logging;
pub mod matrix;
pub mod notify;
pub mod objective;
pub mod params;
pub mod parse;
pub mod report;

mod actor;
mod histogram;
mod quantile;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Dataset(#[from] parse::DatasetError),
    #[error(transparent)]
    Matrix(#[from] matrix::MatrixError),
    #[error(transparent)]
    Cluster(#[from] cluster::ClusterError),
    #[error(transparent)]
    Report(#[from] report::ReportError),
    #[error(transparent)]
    Notify(#[from] notify::NotifyError),
    #[error("no `{metric}` history recorded for eval set `{split}`")]
    MissingMetric {
        split: &'static str,
        metric: &'static str,
    },
    #[error("failed to write to stdout: {0}")]
    Output(#[from] std::io::Error),
}
