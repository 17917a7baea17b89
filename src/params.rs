use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    BinaryLogistic,
}

impl Objective {
    pub fn as_str(self) -> &'static str {
        match self {
            Objective::BinaryLogistic => "binary:logistic",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalMetric {
    LogLoss,
    Error,
}

impl EvalMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            EvalMetric::LogLoss => "logloss",
            EvalMetric::Error => "error",
        }
    }
}

impl fmt::Display for EvalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booster hyperparameters. Tree settings default to the usual XGBoost values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoosterParams {
    pub objective: Objective,
    pub eval_metric: Vec<EvalMetric>,
    pub learning_rate: f64,
    pub num_boost_round: usize,
    pub max_depth: usize,
    pub lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
    pub max_bin: usize,
    pub base_score: f64,
}

impl BoosterParams {
    pub const DEFAULT_NUM_BOOST_ROUND: usize = 10;
    pub const DEFAULT_MAX_DEPTH: usize = 6;
    pub const DEFAULT_MAX_BIN: usize = 256;

    /// Logistic objective scored with log-loss then classification error.
    ///
    /// The learning rate is passed through as given, including zero or
    /// negative values.
    pub fn binary_logistic(learning_rate: f64) -> Self {
        Self {
            objective: Objective::BinaryLogistic,
            eval_metric: vec![EvalMetric::LogLoss, EvalMetric::Error],
            learning_rate,
            num_boost_round: Self::DEFAULT_NUM_BOOST_ROUND,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            max_bin: Self::DEFAULT_MAX_BIN,
            base_score: 0.5,
        }
    }
}

/// Parallelism requested from the cluster for one training call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorParams {
    pub num_actors: usize,
    pub cpus_per_actor: usize,
}

impl ActorParams {
    pub const fn new(num_actors: usize, cpus_per_actor: usize) -> Self {
        Self {
            num_actors,
            cpus_per_actor,
        }
    }

    pub fn total_cpus(self) -> usize {
        self.num_actors * self.cpus_per_actor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainOptions {
    pub verbose_eval: bool,
    pub actors: ActorParams,
}
