use std::ops::{AddAssign, Sub};

use crate::objective::GradientPair;
use crate::params::BoosterParams;
use crate::quantile::BinCuts;

/// Splits whose gain does not exceed this are not taken.
const MIN_SPLIT_GAIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct GradStats {
    pub grad: f64,
    pub hess: f64,
}

impl GradStats {
    pub fn add_pair(&mut self, pair: GradientPair) {
        self.grad += pair.grad;
        self.hess += pair.hess;
    }
}

impl AddAssign for GradStats {
    fn add_assign(&mut self, other: Self) {
        self.grad += other.grad;
        self.hess += other.hess;
    }
}

impl Sub for GradStats {
    type Output = GradStats;

    fn sub(self, other: Self) -> Self::Output {
        GradStats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
        }
    }
}

/// Gradient statistics per (feature, bin) for the rows of one tree node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeHistogram {
    pub bins: Vec<GradStats>,
    pub total: GradStats,
}

impl NodeHistogram {
    pub fn zeros(total_bins: usize) -> Self {
        Self {
            bins: vec![GradStats::default(); total_bins],
            total: GradStats::default(),
        }
    }

    pub fn merge(&mut self, other: &NodeHistogram) {
        for (bin, other_bin) in self.bins.iter_mut().zip(&other.bins) {
            *bin += *other_bin;
        }
        self.total += other.total;
    }
}

/// Sums the histograms every actor built for the same open nodes.
pub(crate) fn allreduce(per_actor: Vec<Vec<NodeHistogram>>) -> Vec<NodeHistogram> {
    let mut actors = per_actor.into_iter();
    let Some(mut reduced) = actors.next() else {
        return Vec::new();
    };
    for histograms in actors {
        for (target, histogram) in reduced.iter_mut().zip(&histograms) {
            target.merge(histogram);
        }
    }
    reduced
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SplitCandidate {
    pub feature: usize,
    pub bin: usize,
    pub gain: f64,
    pub left: GradStats,
    pub right: GradStats,
}

fn score(stats: GradStats, lambda: f64) -> f64 {
    stats.grad * stats.grad / (stats.hess + lambda)
}

pub(crate) fn leaf_weight(stats: GradStats, params: &BoosterParams) -> f64 {
    -stats.grad / (stats.hess + params.lambda)
}

pub(crate) fn split_gain(left: GradStats, right: GradStats, params: &BoosterParams) -> f64 {
    let parent = GradStats {
        grad: left.grad + right.grad,
        hess: left.hess + right.hess,
    };
    0.5 * (score(left, params.lambda) + score(right, params.lambda)
        - score(parent, params.lambda))
        - params.gamma
}

/// Best split of a node, scanning bins left to right for every feature.
pub(crate) fn find_best_split(
    histogram: &NodeHistogram,
    cuts: &BinCuts,
    params: &BoosterParams,
) -> Option<SplitCandidate> {
    let mut best: Option<SplitCandidate> = None;

    for feature in 0..cuts.nfeatures() {
        let offset = cuts.offset(feature);
        let nbins = cuts.nbins(feature);
        let mut left = GradStats::default();

        // the last bin cannot be a split point: its left side is the whole node
        for bin in 0..nbins.saturating_sub(1) {
            left += histogram.bins[offset + bin];
            let right = histogram.total - left;

            if left.hess < params.min_child_weight || right.hess < params.min_child_weight {
                continue;
            }

            let gain = split_gain(left, right, params);
            if gain <= MIN_SPLIT_GAIN {
                continue;
            }
            if !best.is_some_and(|current| gain <= current.gain) {
                best = Some(SplitCandidate {
                    feature,
                    bin,
                    gain,
                    left,
                    right,
                });
            }
        }
    }

    best
}
