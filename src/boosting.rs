//! Driver side of a distributed boosting run.
//!
//! Each round the driver asks every worker actor for gradient histograms of
//! the currently open tree nodes, sums them, picks splits and broadcasts the
//! result back. Trees grow depth-wise until `max_depth` or until no split has
//! positive gain.

use rayon::prelude::*;

use crate::actor::{EvalShard, Route, WorkerActor};
use crate::booster::{Booster, Node, Tree};
use crate::evaluation::{EvalsResult, MetricSums};
use crate::histogram::{allreduce, find_best_split, leaf_weight};
use crate::matrix::{DistributedMatrix, MatrixError};
use crate::params::{BoosterParams, TrainOptions};
use crate::quantile::BinCuts;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("invalid actor parallelism: {num_actors} actors with {cpus_per_actor} CPUs each")]
    InvalidActors {
        num_actors: usize,
        cpus_per_actor: usize,
    },
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error("label {value} in row {row} of `{split}` is invalid for objective {objective}")]
    InvalidLabel {
        split: String,
        row: usize,
        value: f64,
        objective: &'static str,
    },
    #[error("eval set `{split}` has {found} features, training matrix has {expected}")]
    FeatureMismatch {
        split: String,
        expected: usize,
        found: usize,
    },
    #[error("failed to start actor pool: {0}")]
    ActorPool(#[from] rayon::ThreadPoolBuildError),
}

struct EvalSet<'a> {
    name: &'a str,
    matrix: &'a DistributedMatrix,
    shards: Vec<EvalShard>,
}

impl<'a> EvalSet<'a> {
    fn new(
        matrix: &'a DistributedMatrix,
        name: &'a str,
        num_actors: usize,
        base_margin: f64,
    ) -> Result<Self, MatrixError> {
        let shards = matrix
            .shard_ranges(num_actors.min(matrix.nrows()))?
            .into_iter()
            .map(|rows| EvalShard::new(rows, base_margin))
            .collect();
        Ok(Self {
            name,
            matrix,
            shards,
        })
    }
}

/// Trains a booster on `dtrain`, appending one value per metric per round to
/// `evals_result` for every entry of `evals`.
///
/// `evals_result` is cleared before training starts.
pub fn train(
    params: &BoosterParams,
    dtrain: &DistributedMatrix,
    evals: &[(&DistributedMatrix, &str)],
    evals_result: &mut EvalsResult,
    options: &TrainOptions,
) -> Result<Booster, TrainingError> {
    let actors = options.actors;
    if actors.num_actors == 0 || actors.cpus_per_actor == 0 {
        return Err(TrainingError::InvalidActors {
            num_actors: actors.num_actors,
            cpus_per_actor: actors.cpus_per_actor,
        });
    }

    validate_labels(params, dtrain, "dtrain")?;
    for &(matrix, name) in evals {
        if matrix.nfeatures() != dtrain.nfeatures() {
            return Err(TrainingError::FeatureMismatch {
                split: name.to_string(),
                expected: dtrain.nfeatures(),
                found: matrix.nfeatures(),
            });
        }
        validate_labels(params, matrix, name)?;
    }

    let shard_ranges = dtrain.shard_ranges(actors.num_actors)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(actors.total_cpus())
        .thread_name(|index| format!("train-actor-{index}"))
        .build()?;

    tracing::info!(
        objective = %params.objective,
        learning_rate = params.learning_rate,
        rounds = params.num_boost_round,
        num_actors = actors.num_actors,
        cpus_per_actor = actors.cpus_per_actor,
        rows = dtrain.nrows(),
        "starting distributed training"
    );

    evals_result.clear();
    let base_margin = params.objective.base_margin(params.base_score);

    pool.install(|| -> Result<Booster, TrainingError> {
        let sketches: Vec<Vec<Vec<f64>>> = shard_ranges
            .par_iter()
            .map(|rows| BinCuts::sketch(dtrain.shard_features(rows.clone()), params.max_bin))
            .collect();
        let cuts = BinCuts::merge(&sketches, dtrain.nfeatures(), params.max_bin);

        let mut workers: Vec<WorkerActor> = shard_ranges
            .into_par_iter()
            .enumerate()
            .map(|(rank, rows)| WorkerActor::new(rank, rows, dtrain, &cuts, base_margin))
            .collect();
        for worker in &workers {
            tracing::debug!(rank = worker.rank(), rows = ?worker.rows(), "actor shard ready");
        }

        let mut eval_sets = evals
            .iter()
            .map(|&(matrix, name)| EvalSet::new(matrix, name, actors.num_actors, base_margin))
            .collect::<Result<Vec<_>, MatrixError>>()?;

        let mut trees = Vec::with_capacity(params.num_boost_round);
        for round in 0..params.num_boost_round {
            workers
                .par_iter_mut()
                .for_each(|worker| worker.compute_gradients(params.objective));

            let tree = grow_tree(&mut workers, &cuts, params);

            tracing::debug!(round, leaves = tree.num_leaves(), "tree grown");

            let mut line = format!("[{round}]");
            for eval_set in &mut eval_sets {
                let values = evaluate(eval_set, &tree, params);
                for (metric, value) in params.eval_metric.iter().zip(values) {
                    evals_result.record(eval_set.name, metric.as_str(), value);
                    line.push_str(&format!("\t{}-{}:{value:.5}", eval_set.name, metric));
                }
            }
            if options.verbose_eval {
                tracing::info!("{line}");
            } else {
                tracing::debug!("{line}");
            }

            trees.push(tree);
        }

        Ok(Booster::new(params.objective, base_margin, trees))
    })
}

fn validate_labels(
    params: &BoosterParams,
    matrix: &DistributedMatrix,
    split: &str,
) -> Result<(), TrainingError> {
    match matrix
        .labels()
        .iter()
        .position(|&label| !params.objective.validate_label(label))
    {
        Some(row) => Err(TrainingError::InvalidLabel {
            split: split.to_string(),
            row,
            value: matrix.labels()[row],
            objective: params.objective.as_str(),
        }),
        None => Ok(()),
    }
}

/// Grows one tree and folds its leaf weights into every worker's margins.
fn grow_tree(workers: &mut [WorkerActor], cuts: &BinCuts, params: &BoosterParams) -> Tree {
    workers.par_iter_mut().for_each(WorkerActor::reset_positions);

    let mut nodes = vec![Node::Leaf { weight: 0.0 }];
    let mut open = vec![0];

    for depth in 0..=params.max_depth {
        if open.is_empty() {
            break;
        }

        let mut slots = vec![None; nodes.len()];
        for (slot, &node) in open.iter().enumerate() {
            slots[node] = Some(slot);
        }

        let per_worker: Vec<_> = workers
            .par_iter()
            .map(|worker| worker.build_histograms(&slots, open.len(), cuts))
            .collect();
        let histograms = allreduce(per_worker);

        let mut routes = vec![None; nodes.len()];
        let mut next = Vec::new();
        for (&node, histogram) in open.iter().zip(&histograms) {
            let split = if depth < params.max_depth {
                find_best_split(histogram, cuts, params)
            } else {
                None
            };

            match split {
                Some(candidate) => {
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf { weight: 0.0 });
                    nodes.push(Node::Leaf { weight: 0.0 });
                    nodes[node] = Node::Split {
                        feature: candidate.feature,
                        threshold: cuts.threshold(candidate.feature, candidate.bin),
                        left,
                        right,
                    };
                    routes[node] = Some(Route {
                        feature: candidate.feature,
                        bin: u16::try_from(candidate.bin).unwrap_or(u16::MAX),
                        left,
                        right,
                    });
                    next.push(left);
                    next.push(right);
                }
                None => {
                    nodes[node] = Node::Leaf {
                        weight: leaf_weight(histogram.total, params) * params.learning_rate,
                    };
                }
            }
        }

        workers
            .par_iter_mut()
            .for_each(|worker| worker.apply_splits(&routes));
        open = next;
    }

    let leaf_weights: Vec<f64> = nodes
        .iter()
        .map(|node| match node {
            Node::Leaf { weight } => *weight,
            Node::Split { .. } => 0.0,
        })
        .collect();
    workers
        .par_iter_mut()
        .for_each(|worker| worker.apply_leaves(&leaf_weights));

    Tree::from_nodes(nodes)
}

fn evaluate(eval_set: &mut EvalSet<'_>, tree: &Tree, params: &BoosterParams) -> Vec<f64> {
    let matrix = eval_set.matrix;
    eval_set
        .shards
        .par_iter_mut()
        .map(|shard| {
            shard.add_tree(tree, matrix);
            shard.metric_sums(matrix, params.objective, &params.eval_metric)
        })
        .reduce(
            || MetricSums::zeros(params.eval_metric.len()),
            |left, right| left.merge(&right),
        )
        .means()
}
