use crate::params::{EvalMetric, Objective};

const PROBABILITY_EPSILON: f64 = 1e-16;

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Inverse of [`sigmoid`], used to turn the base score into a starting margin.
pub fn logit(probability: f64) -> f64 {
    let probability = probability.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
    (probability / (1.0 - probability)).ln()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientPair {
    pub grad: f64,
    pub hess: f64,
}

impl Objective {
    pub fn base_margin(self, base_score: f64) -> f64 {
        match self {
            Objective::BinaryLogistic => logit(base_score),
        }
    }

    pub fn transform(self, margin: f64) -> f64 {
        match self {
            Objective::BinaryLogistic => sigmoid(margin),
        }
    }

    /// First and second derivative of the loss with respect to the margin.
    pub fn gradient(self, margin: f64, label: f64) -> GradientPair {
        match self {
            Objective::BinaryLogistic => {
                let probability = sigmoid(margin);
                GradientPair {
                    grad: probability - label,
                    hess: (probability * (1.0 - probability)).max(PROBABILITY_EPSILON),
                }
            }
        }
    }

    pub fn validate_label(self, label: f64) -> bool {
        match self {
            Objective::BinaryLogistic => (0.0..=1.0).contains(&label),
        }
    }
}

impl EvalMetric {
    /// Per-row contribution; the metric value is the mean over all rows.
    pub fn row_loss(self, probability: f64, label: f64) -> f64 {
        match self {
            EvalMetric::LogLoss => {
                let probability =
                    probability.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                -(label * probability.ln() + (1.0 - label) * (1.0 - probability).ln())
            }
            EvalMetric::Error => {
                let predicted = if probability > 0.5 { 1.0 } else { 0.0 };
                if (predicted - label).abs() > f64::EPSILON {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}
