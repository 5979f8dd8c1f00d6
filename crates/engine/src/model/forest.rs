//! Bagged regression-tree ensemble.
//!
//! Binary targets are fit as 0/1 regressions, so a leaf value is the share
//! of positives that reached it and the ensemble mean is a probability.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use simdecide_core::{EngineError, EngineResult};

/// Minimum SSE reduction for a split to count.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForestParams {
    pub trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub max_features: Option<usize>,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
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

/// One regression tree stored as a flat node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => at = if x[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    pub fn split_count(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Split { .. })).count()
    }
}

struct Grower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    params: &'a ForestParams,
    features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl Grower<'_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let (sum, sum_sq) = rows.iter().fold((0.0, 0.0), |(s, q), &i| (s + self.y[i], q + self.y[i] * self.y[i]));
        let n = rows.len() as f64;
        let mean = sum / n;
        let sse = sum_sq - sum * sum / n;

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= self.params.max_depth || rows.len() < 2 * self.params.min_samples_leaf || sse <= MIN_GAIN {
            return id;
        }
        let Some(best) = self.best_split(&rows, sse) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&i| self.x[i][best.feature] <= best.threshold);
        self.gains[best.feature] += best.gain;

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let mut all: Vec<usize> = (0..self.features).collect();
        let Some(m) = self.params.max_features.filter(|m| *m < self.features) else {
            return all;
        };
        // Partial Fisher-Yates.
        for i in 0..m {
            let j = self.rng.gen_range(i..all.len());
            all.swap(i, j);
        }
        all.truncate(m);
        all
    }

    fn best_split(&mut self, rows: &[usize], parent_sse: f64) -> Option<BestSplit> {
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<BestSplit> = None;

        for feature in self.candidate_features() {
            let mut column: Vec<(f64, f64)> = rows.iter().map(|&i| (self.x[i][feature], self.y[i])).collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total: f64 = column.iter().map(|(_, y)| y).sum();
            let total_sq: f64 = column.iter().map(|(_, y)| y * y).sum();
            let n = column.len();

            let mut left_sum = 0.0;
            for split in 1..n {
                left_sum += column[split - 1].1;
                if split < min_leaf || n - split < min_leaf {
                    continue;
                }
                if column[split - 1].0 == column[split].0 {
                    continue;
                }
                let (nl, nr) = (split as f64, (n - split) as f64);
                let right_sum = total - left_sum;
                let child_sse = total_sq - left_sum * left_sum / nl - right_sum * right_sum / nr;
                let gain = parent_sse - child_sse;
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (column[split - 1].0 + column[split].0) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Bagged ensemble of [`RegressionTree`]s with impurity-based importances.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forest {
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
}

impl Forest {
    /// Fit on encoded rows. Tree `t` bootstraps with `seed + t`, so the
    /// ensemble is fully determined by its inputs.
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> EngineResult<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(EngineError::training(format!(
                "need matching non-empty inputs, got {} rows and {} labels",
                x.len(),
                y.len()
            )));
        }
        let features = x[0].len();
        if features == 0 || x.iter().any(|row| row.len() != features) {
            return Err(EngineError::training("rows must share a non-zero width"));
        }
        if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
            return Err(EngineError::training("training data contains non-finite values"));
        }

        let n = x.len();
        let mut gains = vec![0.0; features];
        let mut trees = Vec::with_capacity(params.trees);
        for t in 0..params.trees {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

            let mut grower = Grower {
                x,
                y,
                params,
                features,
                rng,
                nodes: Vec::new(),
                gains: vec![0.0; features],
            };
            grower.grow(sample, 0);
            for (total, g) in gains.iter_mut().zip(&grower.gains) {
                *total += g;
            }
            trees.push(RegressionTree { nodes: grower.nodes });
        }

        let total: f64 = gains.iter().sum();
        let importances = if total > 0.0 {
            gains.iter().map(|g| g / total).collect()
        } else {
            vec![0.0; features]
        };
        Ok(Self { trees, importances })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn split_count(&self) -> usize {
        self.trees.iter().map(RegressionTree::split_count).sum()
    }

    /// Normalized to sum to 1 (all zeros when no tree split).
    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// Per-tree predictions.
    pub fn predict_each(&self, x: &[f64]) -> Vec<f64> {
        self.trees.iter().map(|t| t.predict(x)).collect()
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let each = self.predict_each(x);
        each.iter().sum::<f64>() / each.len().max(1) as f64
    }
}
