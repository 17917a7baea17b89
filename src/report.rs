use std::fs;
use std::path::{Path, PathBuf};

pub const REPORT_SUFFIX: &str = "_training_results.txt";

#[derive(Debug, thiserror::Error)]
#[error("failed to write report {path}: {source}")]
pub struct ReportError {
    pub path: PathBuf,
    pub source: std::io::Error,
}

pub fn report_file_name(user: &str) -> String {
    format!("{user}{REPORT_SUFFIX}")
}

pub fn learning_rate_line(learning_rate: f64) -> String {
    format!("Using learning rate: {learning_rate:.3}")
}

pub fn final_error_line(final_error: f64) -> String {
    format!("Final training error: {final_error:.4}")
}

/// Outcome of one training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub learning_rate: f64,
    pub final_error: f64,
}

impl RunReport {
    /// File contents; there is no newline after the second line.
    pub fn render(&self) -> String {
        format!(
            "Learning rate used: {:.4}\n{}",
            self.learning_rate,
            final_error_line(self.final_error)
        )
    }

    /// Creates or truncates `<user>_training_results.txt` in `dir`.
    pub fn write(&self, dir: &Path, user: &str) -> Result<PathBuf, ReportError> {
        let path = dir.join(report_file_name(user));
        fs::write(&path, self.render()).map_err(|source| ReportError {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "report written");
        Ok(path)
    }
}
