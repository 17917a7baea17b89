use ndarray::{ArrayView1, ArrayView2};

const MAX_BINS: usize = u16::MAX as usize;

/// Ascending cut values per feature.
///
/// Bin `b` of a feature holds values in `(cuts[b - 1], cuts[b]]`; values
/// above the last cut fall into the last bin.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BinCuts {
    cuts: Vec<Vec<f64>>,
    offsets: Vec<usize>,
}

impl BinCuts {
    /// Candidate cuts for every feature of one shard.
    pub fn sketch(shard: ArrayView2<'_, f64>, max_bin: usize) -> Vec<Vec<f64>> {
        let max_bin = max_bin.clamp(1, MAX_BINS);
        shard
            .columns()
            .into_iter()
            .map(|column| select_quantiles(&sorted_unique(column), max_bin))
            .collect()
    }

    /// Merges the per-shard sketches into global cuts.
    pub fn merge(sketches: &[Vec<Vec<f64>>], nfeatures: usize, max_bin: usize) -> Self {
        let max_bin = max_bin.clamp(1, MAX_BINS);
        let mut cuts = Vec::with_capacity(nfeatures);

        for feature in 0..nfeatures {
            let mut values: Vec<f64> = sketches
                .iter()
                .filter_map(|sketch| sketch.get(feature))
                .flatten()
                .copied()
                .collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            if values.is_empty() {
                values.push(0.0);
            }
            cuts.push(select_quantiles(&values, max_bin));
        }

        let mut offsets = Vec::with_capacity(nfeatures + 1);
        let mut total = 0;
        offsets.push(0);
        for feature_cuts in &cuts {
            total += feature_cuts.len();
            offsets.push(total);
        }

        Self { cuts, offsets }
    }

    pub fn nfeatures(&self) -> usize {
        self.cuts.len()
    }

    pub fn nbins(&self, feature: usize) -> usize {
        self.cuts[feature].len()
    }

    pub fn total_bins(&self) -> usize {
        self.offsets[self.cuts.len()]
    }

    /// Position of the first bin of `feature` in a flattened histogram.
    pub fn offset(&self, feature: usize) -> usize {
        self.offsets[feature]
    }

    pub fn bin(&self, feature: usize, value: f64) -> u16 {
        let cuts = &self.cuts[feature];
        let index = cuts.partition_point(|&cut| cut < value).min(cuts.len() - 1);
        u16::try_from(index).unwrap_or(u16::MAX)
    }

    /// Raw threshold equivalent to routing bins `0..=bin` to the left child.
    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.cuts[feature][bin]
    }
}

fn sorted_unique(column: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut values: Vec<f64> = column.iter().copied().filter(|value| !value.is_nan()).collect();
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

/// Picks at most `max` evenly spaced values, always keeping the maximum.
fn select_quantiles(sorted: &[f64], max: usize) -> Vec<f64> {
    if sorted.len() <= max {
        return sorted.to_vec();
    }
    (1..=max)
        .map(|i| sorted[i * sorted.len() / max - 1])
        .collect()
}
