//! Random-forest regression
//!
//! Bagged CART regression trees. Each split minimizes the summed squared error
//! of its two children over every feature; trees grow until leaves are pure or
//! too small to split. The forest predicts the mean of its trees.
//!
//! Fitting is deterministic for a given seed: the master RNG draws one seed
//! per tree up front, so tree `i` sees the same bootstrap sample whether the
//! trees are fitted sequentially or in parallel.

use crate::types::{YieldError, YieldResult};
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Random forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub seed: u64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_depth: Option<usize>,
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 150,
            seed: 42,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_depth: None,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single CART regression tree stored as a flat node list, root first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    error: f64,
}

impl RegressionTree {
    /// Fit on the rows of `x` listed in `samples` (repeats allowed)
    pub fn fit(x: &Array2<f64>, y: &[f64], samples: Vec<usize>, params: &ForestParams) -> Self {
        let mut tree = RegressionTree { nodes: Vec::new() };
        tree.grow(x, y, samples, 0, params);
        tree
    }

    fn grow(
        &mut self,
        x: &Array2<f64>,
        y: &[f64],
        samples: Vec<usize>,
        depth: usize,
        params: &ForestParams,
    ) -> usize {
        let index = self.nodes.len();
        let n = samples.len();
        let mean = samples.iter().map(|&i| y[i]).sum::<f64>() / n as f64;
        self.nodes.push(Node::Leaf { value: mean });

        let pure = samples.iter().all(|&i| y[i] == y[samples[0]]);
        let too_deep = params.max_depth.map_or(false, |d| depth >= d);
        if pure || too_deep || n < params.min_samples_split {
            return index;
        }

        let Some(split) = best_split(x, y, &samples, params.min_samples_leaf) else {
            return index;
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| x[[i, split.feature]] <= split.threshold);

        let left = self.grow(x, y, left_samples, depth + 1, params);
        let right = self.grow(x, y, right_samples, depth + 1, params);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    /// Missing (`NaN`) inputs fail every `<=` test and follow the right branch
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Structural check for trees that did not come from [`RegressionTree::fit`].
    /// Children must sit after their parent so traversal always terminates.
    pub fn validate(&self, n_features: usize) -> YieldResult<()> {
        if self.nodes.is_empty() {
            return Err(YieldError::InvalidFormat("Tree has no nodes".to_string()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature >= n_features {
                    return Err(YieldError::InvalidFormat(format!(
                        "Node {} splits on feature {} of {}",
                        index, feature, n_features
                    )));
                }
                if threshold.is_nan() {
                    return Err(YieldError::InvalidFormat(format!(
                        "Node {} has no threshold",
                        index
                    )));
                }
                for child in [*left, *right] {
                    if child <= index || child >= self.nodes.len() {
                        return Err(YieldError::InvalidFormat(format!(
                            "Node {} points to invalid child {} ({} nodes)",
                            index,
                            child,
                            self.nodes.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], i: usize) -> usize {
            match &nodes[i] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

fn best_split(
    x: &Array2<f64>,
    y: &[f64],
    samples: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = samples.len();
    let min_leaf = min_leaf.max(1);
    let total_sum: f64 = samples.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = samples.iter().map(|&i| y[i] * y[i]).sum();

    let mut best: Option<SplitCandidate> = None;
    let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);

    for feature in 0..x.ncols() {
        sorted.clear();
        sorted.extend(samples.iter().map(|&i| (x[[i, feature]], y[i])));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 1..n {
            let (value, target) = sorted[k - 1];
            left_sum += target;
            left_sq += target * target;

            if k < min_leaf || n - k < min_leaf || value >= sorted[k].0 {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let error = (left_sq - left_sum * left_sum / k as f64)
                + (right_sq - right_sum * right_sum / (n - k) as f64);

            if best.as_ref().map_or(true, |b| error < b.error) {
                let upper = sorted[k].0;
                let mut threshold = value + (upper - value) / 2.0;
                if threshold >= upper {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    error,
                });
            }
        }
    }
    best
}

/// Bagged ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn fit(x: &Array2<f64>, y: &[f64], params: ForestParams) -> YieldResult<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 {
            return Err(YieldError::InsufficientData(
                "Cannot fit a forest on zero samples".to_string(),
            ));
        }
        if y.len() != n_samples {
            return Err(YieldError::InvalidFormat(format!(
                "{} feature rows but {} targets",
                n_samples,
                y.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(YieldError::InvalidFormat("Forest needs at least one tree".to_string()));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(YieldError::InvalidFormat(
                "Training data contains missing or non-finite values".to_string(),
            ));
        }

        log::info!(
            "Fitting random forest: {} trees, {} samples, {} features",
            params.n_trees,
            n_samples,
            n_features
        );

        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| master.gen()).collect();

        let fit_one = |seed: u64| {
            let samples = if params.bootstrap {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
            } else {
                (0..n_samples).collect()
            };
            RegressionTree::fit(x, y, samples, &params)
        };

        #[cfg(feature = "parallel")]
        let trees: Vec<RegressionTree> = seeds.par_iter().map(|&s| fit_one(s)).collect();
        #[cfg(not(feature = "parallel"))]
        let trees: Vec<RegressionTree> = seeds.iter().map(|&s| fit_one(s)).collect();

        log::debug!(
            "Forest fitted, mean tree size {:.1} nodes",
            trees.iter().map(|t| t.n_nodes()).sum::<usize>() as f64 / trees.len() as f64
        );

        Ok(Self {
            params,
            n_features,
            trees,
        })
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict(&self, x: &Array2<f64>) -> YieldResult<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(YieldError::InvalidFormat(format!(
                "Model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }

    /// Check a deserialized forest before it is used for prediction
    pub fn validate(&self) -> YieldResult<()> {
        if self.trees.is_empty() {
            return Err(YieldError::InvalidFormat("Forest has no trees".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features).map_err(|e| {
                YieldError::InvalidFormat(format!("Tree {}: {}", i, e))
            })?;
        }
        Ok(())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }
}
