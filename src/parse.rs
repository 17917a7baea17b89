use csv::ReaderBuilder;
use ndarray::{Array1, Array2};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

pub const DIMENSIONS: usize = 30;

/// Built-in dataset in the Wisconsin diagnostic layout: 569 rows, 212 of
/// them malignant. Replace `data/breast-cancer.csv` with the UCI file to
/// train on the original measurements.
pub const BUILTIN_DATASET: &str = include_str!("../data/breast-cancer.csv");

const DIAGNOSIS_FIELD_INDEX: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnosis {
    Malignant,
    Benign,
}

impl Diagnosis {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "M" => Some(Diagnosis::Malignant),
            "B" => Some(Diagnosis::Benign),
            _ => None,
        }
    }

    /// Binary target used for training: malignant is the negative class.
    pub fn label(self) -> f64 {
        match self {
            Diagnosis::Malignant => 0.0,
            Diagnosis::Benign => 1.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to open dataset {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed dataset CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: missing diagnosis column")]
    MissingDiagnosis { row: usize },
    #[error("row {row}: unexpected diagnosis {value:?}")]
    Diagnosis { row: usize, value: String },
    #[error("row {row}, column {column}: invalid feature value {value:?}")]
    Value {
        row: usize,
        column: usize,
        value: String,
    },
    #[error("row {row}: expected {expected} features, found {found}")]
    FeatureCount {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("dataset contains no rows")]
    Empty,
}

/// Feature matrix and binary labels, one row per sample.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
}

impl Dataset {
    pub fn nrows(&self) -> usize {
        self.features.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.features.ncols()
    }
}

pub fn load(file_path: &Path) -> Result<Dataset, DatasetError> {
    let file = File::open(file_path).map_err(|source| DatasetError::Open {
        path: file_path.to_path_buf(),
        source,
    })?;
    let dataset = from_reader(BufReader::new(file))?;

    tracing::debug!(
        path = %file_path.display(),
        rows = dataset.nrows(),
        features = dataset.nfeatures(),
        "dataset loaded"
    );
    Ok(dataset)
}

pub fn builtin() -> Result<Dataset, DatasetError> {
    let dataset = from_reader(BUILTIN_DATASET.as_bytes())?;
    tracing::debug!(rows = dataset.nrows(), "built-in dataset loaded");
    Ok(dataset)
}

/// Parses `id, diagnosis, features...` rows. Empty trailing fields are ignored.
pub fn from_reader<R: Read>(reader: R) -> Result<Dataset, DatasetError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut values = Vec::new();
    let mut labels = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let record = result?;

        let diagnosis_str = record
            .get(DIAGNOSIS_FIELD_INDEX)
            .ok_or(DatasetError::MissingDiagnosis { row })?;
        let diagnosis =
            Diagnosis::from_code(diagnosis_str).ok_or_else(|| DatasetError::Diagnosis {
                row,
                value: diagnosis_str.to_string(),
            })?;

        let mut found = 0;
        for (column, value) in record.iter().enumerate().skip(DIAGNOSIS_FIELD_INDEX + 1) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let parsed = value.parse::<f64>().map_err(|_| DatasetError::Value {
                row,
                column,
                value: value.to_string(),
            })?;
            values.push(parsed);
            found += 1;
        }

        if found != DIMENSIONS {
            return Err(DatasetError::FeatureCount {
                row,
                expected: DIMENSIONS,
                found,
            });
        }

        labels.push(diagnosis.label());
    }

    if labels.is_empty() {
        return Err(DatasetError::Empty);
    }

    let features = Array2::from_shape_vec((labels.len(), DIMENSIONS), values)
        .map_err(|_| DatasetError::Empty)?;

    Ok(Dataset {
        features,
        labels: Array1::from_vec(labels),
    })
}
