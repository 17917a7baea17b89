use std::ops::Range;

use ndarray::Array2;

use crate::booster::Tree;
use crate::evaluation::MetricSums;
use crate::histogram::NodeHistogram;
use crate::matrix::DistributedMatrix;
use crate::objective::GradientPair;
use crate::params::{EvalMetric, Objective};
use crate::quantile::BinCuts;

/// Split broadcast by the driver for one open node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Route {
    pub feature: usize,
    pub bin: u16,
    pub left: usize,
    pub right: usize,
}

/// Worker owning one contiguous shard of the training matrix.
///
/// An actor keeps its rows quantised to bins, the running margin of each
/// row and, while a tree grows, the node every row currently sits in.
#[derive(Debug)]
pub(crate) struct WorkerActor {
    rank: usize,
    rows: Range<usize>,
    bins: Array2<u16>,
    labels: Vec<f64>,
    margins: Vec<f64>,
    gradients: Vec<GradientPair>,
    positions: Vec<usize>,
}

impl WorkerActor {
    pub fn new(
        rank: usize,
        rows: Range<usize>,
        matrix: &DistributedMatrix,
        cuts: &BinCuts,
        base_margin: f64,
    ) -> Self {
        let shard = matrix.shard_features(rows.clone());
        let bins = Array2::from_shape_fn(shard.dim(), |(i, feature)| {
            cuts.bin(feature, shard[(i, feature)])
        });
        let labels = matrix.shard_labels(rows.clone()).to_vec();
        let len = rows.len();

        Self {
            rank,
            rows,
            bins,
            labels,
            margins: vec![base_margin; len],
            gradients: vec![GradientPair { grad: 0.0, hess: 0.0 }; len],
            positions: vec![0; len],
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    pub fn compute_gradients(&mut self, objective: Objective) {
        for ((pair, &margin), &label) in self
            .gradients
            .iter_mut()
            .zip(&self.margins)
            .zip(&self.labels)
        {
            *pair = objective.gradient(margin, label);
        }
    }

    pub fn reset_positions(&mut self) {
        self.positions.fill(0);
    }

    /// Local histograms for the open nodes; `slots[node]` names the output
    /// slot of an open node and is `None` for nodes already finished.
    pub fn build_histograms(
        &self,
        slots: &[Option<usize>],
        open_nodes: usize,
        cuts: &BinCuts,
    ) -> Vec<NodeHistogram> {
        let mut histograms = vec![NodeHistogram::zeros(cuts.total_bins()); open_nodes];

        for (row, &node) in self.positions.iter().enumerate() {
            let Some(slot) = slots.get(node).copied().flatten() else {
                continue;
            };
            let pair = self.gradients[row];
            let histogram = &mut histograms[slot];
            histogram.total.add_pair(pair);
            for (feature, &bin) in self.bins.row(row).iter().enumerate() {
                histogram.bins[cuts.offset(feature) + usize::from(bin)].add_pair(pair);
            }
        }

        histograms
    }

    pub fn apply_splits(&mut self, routes: &[Option<Route>]) {
        for (row, node) in self.positions.iter_mut().enumerate() {
            if let Some(route) = routes.get(*node).copied().flatten() {
                *node = if self.bins[(row, route.feature)] <= route.bin {
                    route.left
                } else {
                    route.right
                };
            }
        }
    }

    /// Adds the weight of the leaf each row ended in to its margin.
    pub fn apply_leaves(&mut self, leaf_weights: &[f64]) {
        for (margin, &node) in self.margins.iter_mut().zip(&self.positions) {
            *margin += leaf_weights[node];
        }
    }
}

/// Running predictions for one shard of an evaluation matrix.
#[derive(Debug)]
pub(crate) struct EvalShard {
    rows: Range<usize>,
    margins: Vec<f64>,
}

impl EvalShard {
    pub fn new(rows: Range<usize>, base_margin: f64) -> Self {
        let len = rows.len();
        Self {
            rows,
            margins: vec![base_margin; len],
        }
    }

    pub fn add_tree(&mut self, tree: &Tree, matrix: &DistributedMatrix) {
        let shard = matrix.shard_features(self.rows.clone());
        for (margin, row) in self.margins.iter_mut().zip(shard.rows()) {
            *margin += tree.predict(row);
        }
    }

    pub fn metric_sums(
        &self,
        matrix: &DistributedMatrix,
        objective: Objective,
        metrics: &[EvalMetric],
    ) -> MetricSums {
        let labels = matrix.labels();
        let mut sums = MetricSums::zeros(metrics.len());
        for (offset, &margin) in self.margins.iter().enumerate() {
            sums.add_row(
                metrics,
                objective.transform(margin),
                labels[self.rows.start + offset],
            );
        }
        sums
    }
}
