use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Slice};

use crate::parse::Dataset;

#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("training matrix has no rows")]
    Empty,
    #[error("feature matrix has {rows} rows but {labels} labels were given")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("cannot split {rows} rows across {shards} actors")]
    Shards { rows: usize, shards: usize },
}

/// Labelled data shared by every worker actor of a training call.
///
/// The matrix is immutable once built; actors receive contiguous row
/// ranges from [`DistributedMatrix::shard_ranges`].
#[derive(Debug, Clone)]
pub struct DistributedMatrix {
    features: Array2<f64>,
    labels: Array1<f64>,
}

impl DistributedMatrix {
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Result<Self, MatrixError> {
        if features.nrows() == 0 {
            return Err(MatrixError::Empty);
        }
        if features.nrows() != labels.len() {
            return Err(MatrixError::LengthMismatch {
                rows: features.nrows(),
                labels: labels.len(),
            });
        }

        Ok(Self { features, labels })
    }

    pub fn from_dataset(dataset: Dataset) -> Result<Self, MatrixError> {
        Self::new(dataset.features, dataset.labels)
    }

    pub fn nrows(&self) -> usize {
        self.features.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> ArrayView1<'_, f64> {
        self.labels.view()
    }

    /// Feature rows of one shard.
    pub fn shard_features(&self, rows: Range<usize>) -> ArrayView2<'_, f64> {
        self.features.slice_axis(Axis(0), Slice::from(rows))
    }

    pub fn shard_labels(&self, rows: Range<usize>) -> ArrayView1<'_, f64> {
        self.labels.slice_axis(Axis(0), Slice::from(rows))
    }

    /// Splits the rows into `shards` contiguous ranges whose sizes differ by
    /// at most one. Every row belongs to exactly one range.
    pub fn shard_ranges(&self, shards: usize) -> Result<Vec<Range<usize>>, MatrixError> {
        let rows = self.nrows();
        if shards == 0 || shards > rows {
            return Err(MatrixError::Shards { rows, shards });
        }

        let base = rows / shards;
        let remainder = rows % shards;

        let mut ranges = Vec::with_capacity(shards);
        let mut start = 0;
        for shard in 0..shards {
            let len = base + usize::from(shard < remainder);
            ranges.push(start..start + len);
            start += len;
        }

        Ok(ranges)
    }
}
