//! Isolation forest anomaly scorer.
//!
//! Each tree recursively partitions a random sub-sample of rows on a random
//! feature at a random split value until every row is isolated or the
//! height limit is reached. Rows that isolate in few splits are anomalous.
//! The score of a row is `2^(-E[h(x)] / c(ψ))`, where `E[h(x)]` is its mean
//! path length over all trees and `c(ψ)` is the average path length of an
//! unsuccessful search in a binary tree of the sub-sample size. Scores lie
//! in (0, 1]; values near 1 are anomalies, values well below 0.5 are normal.
//!
//! Tree construction is driven by a `StdRng` seeded from the config, so a
//! given matrix always yields the same scores.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::analysis::anomaly::{AnomalyModel, FeatureMatrix};
use crate::config::AnomalyConfig;
use crate::model::ModelFitError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    height_limit: usize,
}

impl TreeBuilder<'_> {
    fn grow(&self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> Node {
        if depth >= self.height_limit || indices.len() <= 1 {
            return Node::Leaf {
                size: indices.len(),
            };
        }

        // Only features that still vary inside this node can split it.
        let n_features = self.rows[indices[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|feature| {
                let (lo, hi) = indices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &i| {
                        let v = self.rows[i][feature];
                        (lo.min(v), hi.max(v))
                    },
                );
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();

        if candidates.is_empty() {
            return Node::Leaf {
                size: indices.len(),
            };
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);

        // threshold ∈ [lo, hi): `lo` always goes left and `hi` always goes
        // right, so neither child is empty.
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i][feature] <= threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.grow(left, depth + 1, rng)),
            right: Box::new(self.grow(right, depth + 1, rng)),
        }
    }
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] <= *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Isolation forest configured by tree count, sub-sample size and seed.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForest {
    pub n_trees: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl IsolationForest {
    pub fn from_config(config: &AnomalyConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_samples: config.max_samples,
            seed: config.seed,
        }
    }
}

impl AnomalyModel for IsolationForest {
    fn name(&self) -> &str {
        "isolation forest"
    }

    fn fit_score(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ModelFitError> {
        let rows = matrix.rows();
        if rows.is_empty() {
            return Err(ModelFitError::EmptyMatrix);
        }

        let n = rows.len();
        let sub_sample = self.max_samples.min(n).max(1);
        let height_limit = (sub_sample as f64).log2().ceil().max(1.0) as usize;
        let builder = TreeBuilder { rows, height_limit };

        let mut rng = StdRng::seed_from_u64(self.seed);
        let trees: Vec<Node> = (0..self.n_trees.max(1))
            .map(|_| {
                let indices = index::sample(&mut rng, n, sub_sample).into_vec();
                builder.grow(indices, 0, &mut rng)
            })
            .collect();

        let normaliser = average_path_length(sub_sample);
        let scores = rows
            .iter()
            .map(|row| {
                let mean_path =
                    trees.iter().map(|t| path_length(t, row, 0)).sum::<f64>() / trees.len() as f64;
                if normaliser > 0.0 {
                    2f64.powf(-mean_path / normaliser)
                } else {
                    0.5
                }
            })
            .collect();

        Ok(scores)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
