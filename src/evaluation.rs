use std::collections::BTreeMap;

use crate::params::EvalMetric;

/// Per-round metric history keyed by eval set name, then metric name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalsResult {
    history: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
}

impl EvalsResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn record(&mut self, split: &str, metric: &str, value: f64) {
        self.history
            .entry(split.to_string())
            .or_default()
            .entry(metric.to_string())
            .or_default()
            .push(value);
    }

    pub fn get(&self, split: &str, metric: &str) -> Option<&[f64]> {
        self.history
            .get(split)
            .and_then(|metrics| metrics.get(metric))
            .map(Vec::as_slice)
    }

    /// Value recorded in the final round.
    pub fn last(&self, split: &str, metric: &str) -> Option<f64> {
        self.get(split, metric).and_then(|values| values.last().copied())
    }

    pub fn splits(&self) -> impl Iterator<Item = &str> {
        self.history.keys().map(String::as_str)
    }

}

/// Partial metric sums produced by one actor, reduced by the driver.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MetricSums {
    pub sums: Vec<f64>,
    pub rows: usize,
}

impl MetricSums {
    pub fn zeros(metrics: usize) -> Self {
        Self {
            sums: vec![0.0; metrics],
            rows: 0,
        }
    }

    pub fn add_row(&mut self, metrics: &[EvalMetric], probability: f64, label: f64) {
        for (sum, metric) in self.sums.iter_mut().zip(metrics) {
            *sum += metric.row_loss(probability, label);
        }
        self.rows += 1;
    }

    pub fn merge(mut self, other: &MetricSums) -> Self {
        for (sum, value) in self.sums.iter_mut().zip(&other.sums) {
            *sum += value;
        }
        self.rows += other.rows;
        self
    }

    pub fn means(&self) -> Vec<f64> {
        if self.rows == 0 {
            return vec![0.0; self.sums.len()];
        }
        self.sums.iter().map(|sum| sum / self.rows as f64).collect()
    }
}
