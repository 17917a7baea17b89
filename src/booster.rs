use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::params::Objective;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Rows with `value <= threshold` go to `left`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        weight: f64,
    },
}

/// Regression tree stored as a flat node list rooted at index 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    pub fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { weight } => return weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Trained ensemble returned by a training call.
#[derive(Debug, Clone, PartialEq)]
pub struct Booster {
    objective: Objective,
    base_margin: f64,
    trees: Vec<Tree>,
}

impl Booster {
    pub fn new(objective: Objective, base_margin: f64, trees: Vec<Tree>) -> Self {
        Self {
            objective,
            base_margin,
            trees,
        }
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn num_boosted_rounds(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_margin(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.base_margin + self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>()
    }

    /// Transformed predictions (probabilities for the logistic objective).
    pub fn predict(&self, features: ArrayView2<'_, f64>) -> Array1<f64> {
        features
            .rows()
            .into_iter()
            .map(|row| self.objective.transform(self.predict_margin(row)))
            .collect()
    }
}
