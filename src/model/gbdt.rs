//! Gradient-boosted regression trees
//!
//! Squared-error boosting with exact greedy splits. Small tables only: every split scans
//! every sorted feature column. Models serialize to plain JSON.

use rand::seq::index::sample;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each tree
    pub subsample: f64,
    pub seed: u64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.1,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

/// Tree node; children are indices into the owning tree's node list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Structural defect in a deserialized ensemble
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("tree {tree} has no nodes")]
    Empty { tree: usize },

    #[error("tree {tree} node {node} points at child {child}")]
    BadChild { tree: usize, node: usize, child: usize },

    #[error("tree {tree} node {node} splits on feature {feature} of {n_features}")]
    BadFeature {
        tree: usize,
        node: usize,
        feature: usize,
        n_features: usize,
    },
}

/// Single regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Walk from the root; `x[feature] <= threshold` goes left
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = x.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Children must follow their parent in the node list, so every walk ends at a leaf
    fn validate(&self, tree: usize, n_features: usize) -> Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty { tree });
        }
        for (node, n) in self.nodes.iter().enumerate() {
            let Node::Split {
                feature, left, right, ..
            } = n
            else {
                continue;
            };
            for &child in [left, right] {
                if child <= node || child >= self.nodes.len() {
                    return Err(TreeError::BadChild { tree, node, child });
                }
            }
            if *feature >= n_features {
                return Err(TreeError::BadFeature {
                    tree,
                    node,
                    feature: *feature,
                    n_features,
                });
            }
        }
        Ok(())
    }

    fn fit(x: &[Vec<f64>], residuals: &[f64], rows: &[usize], params: &GbdtParams) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, residuals, rows.to_vec(), 0, params);
        tree
    }

    /// Append the subtree for `rows` and return its root index
    fn grow(
        &mut self,
        x: &[Vec<f64>],
        residuals: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: &GbdtParams,
    ) -> usize {
        let idx = self.nodes.len();
        let mean = rows.iter().map(|&r| residuals[r]).sum::<f64>() / rows.len().max(1) as f64;
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf.max(1) {
            return idx;
        }

        let Some(split) = best_split(x, residuals, &rows, params.min_samples_leaf.max(1)) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&r| x[r][split.feature] <= split.threshold);

        let left = self.grow(x, residuals, left_rows, depth + 1, params);
        let right = self.grow(x, residuals, right_rows, depth + 1, params);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Best variance-reducing split over all features, if any improves on the parent
fn best_split(x: &[Vec<f64>], residuals: &[f64], rows: &[usize], min_leaf: usize) -> Option<Split> {
    let n_features = rows.first().map(|&r| x[r].len())?;
    let n = rows.len() as f64;
    let total: f64 = rows.iter().map(|&r| residuals[r]).sum();
    let parent_score = total * total / n;

    let mut best: Option<Split> = None;
    let mut sorted = rows.to_vec();

    for feature in 0..n_features {
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        for (i, &row) in sorted.iter().enumerate().take(sorted.len() - 1) {
            left_sum += residuals[row];
            let left_n = i + 1;
            let right_n = sorted.len() - left_n;

            let here = x[row][feature];
            let next = x[sorted[i + 1]][feature];
            if here == next || left_n < min_leaf || right_n < min_leaf {
                continue;
            }

            let right_sum = total - left_sum;
            let score = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
            let gain = score - parent_score;

            if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(Split {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}

/// Fitted boosted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    params: GbdtParams,
    n_features: usize,
    base_score: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedRegressor {
    /// Fit on row-major features
    ///
    /// Callers guarantee `x.len() == y.len()`, at least one row, and equal row widths.
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: GbdtParams) -> Self {
        let n = y.len();
        let n_features = x.first().map(Vec::len).unwrap_or(0);
        let base_score = y.iter().sum::<f64>() / n.max(1) as f64;

        let mut predictions = vec![base_score; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut rng = Pcg64Mcg::seed_from_u64(params.seed);

        let all_rows: Vec<usize> = (0..n).collect();
        let sample_size = ((n as f64 * params.subsample.clamp(0.0, 1.0)).round() as usize).clamp(1, n.max(1));

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();

            let rows = if sample_size < n {
                let mut rows = sample(&mut rng, n, sample_size).into_vec();
                rows.sort_unstable();
                rows
            } else {
                all_rows.clone()
            };

            let tree = RegressionTree::fit(x, &residuals, &rows, &params);
            for (pred, row) in predictions.iter_mut().zip(x) {
                *pred += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Self {
            params,
            n_features,
            base_score,
            trees,
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| self.params.learning_rate * t.predict(x))
                .sum::<f64>()
    }

    pub fn predict_batch(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict(row)).collect()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Check the tree structure of a loaded model before it is used for scoring
    pub fn validate(&self) -> Result<(), TreeError> {
        self.trees
            .iter()
            .enumerate()
            .try_for_each(|(i, tree)| tree.validate(i, self.n_features))
    }
}
