//! Isolation-forest outlier scoring.
//!
//! Rows that random axis-aligned splits separate from the rest in few steps
//! get high scores. The same engine serves traffic anomaly detection
//! (auto threshold) and bot detection (fixed contamination).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Score a row from uniformly random data is expected to get.
const AUTO_THRESHOLD: f64 = 0.5;

/// Ensemble parameters. The seed makes every fit reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OutlierConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

const fn default_seed() -> u64 {
    42
}

const fn default_n_trees() -> usize {
    100
}

const fn default_max_samples() -> usize {
    256
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            n_trees: default_n_trees(),
            max_samples: default_max_samples(),
        }
    }
}

/// How scores are turned into outlier flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdPolicy {
    /// Flag rows scoring above what purely random data would score.
    Auto,
    /// Flag the `round(fraction * rows)` highest-scoring rows.
    Contamination(f64),
}

/// Per-row scores (higher = more anomalous) and outlier flags.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierReport {
    pub scores: Vec<f64>,
    pub flags: Vec<bool>,
}

impl OutlierReport {
    /// Indices of flagged rows, in input order.
    pub fn outlier_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, &flagged)| flagged.then_some(i))
    }

    pub fn outlier_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Seeded isolation forest with a pluggable threshold policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlierEngine {
    config: OutlierConfig,
}

impl OutlierEngine {
    pub const fn new(config: OutlierConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &OutlierConfig {
        &self.config
    }

    /// Score every row and flag outliers according to `policy`.
    ///
    /// Rows are feature vectors of equal length. A matrix whose every
    /// feature is constant cannot be partitioned: all rows score 0.5 and
    /// nothing is flagged.
    pub fn detect(&self, rows: &[Vec<f64>], policy: ThresholdPolicy) -> OutlierReport {
        let n = rows.len();
        let Some(scores) = self.score(rows) else {
            tracing::debug!(rows = n, "Degenerate feature matrix, no outliers");
            return OutlierReport {
                scores: vec![AUTO_THRESHOLD; n],
                flags: vec![false; n],
            };
        };

        let flags = match policy {
            ThresholdPolicy::Auto => scores.iter().map(|&s| s > AUTO_THRESHOLD).collect(),
            ThresholdPolicy::Contamination(fraction) => top_fraction(&scores, fraction),
        };

        let report = OutlierReport { scores, flags };
        tracing::debug!(
            rows = n,
            trees = self.config.n_trees,
            ?policy,
            flagged = report.outlier_count(),
            "Outlier scoring complete"
        );
        report
    }

    /// Anomaly score per row in `(0, 1]`, or `None` for degenerate input.
    fn score(&self, rows: &[Vec<f64>]) -> Option<Vec<f64>> {
        let n = rows.len();
        if n == 0 || is_constant(rows) {
            return None;
        }

        let subsample = self.config.max_samples.clamp(1, n);
        let norm = average_path_length(subsample);
        if norm <= 0.0 {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let subsample_f = subsample as f64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let depth_limit = subsample_f.log2().ceil() as usize;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let trees: Vec<Node> = (0..self.config.n_trees.max(1))
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, n, subsample).into_vec();
                grow(rows, sample, 0, depth_limit, &mut rng)
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let tree_count = trees.len() as f64;
        let scores = rows
            .iter()
            .map(|row| {
                let total: f64 = trees.iter().map(|tree| path_length(tree, row)).sum();
                2f64.powf(-(total / tree_count) / norm)
            })
            .collect();
        Some(scores)
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
#[allow(clippy::cast_precision_loss)]
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

fn feature(row: &[f64], index: usize) -> f64 {
    row.get(index).copied().unwrap_or(0.0)
}

fn width(rows: &[Vec<f64>]) -> usize {
    rows.iter().map(Vec::len).max().unwrap_or(0)
}

fn is_constant(rows: &[Vec<f64>]) -> bool {
    let indices: Vec<usize> = (0..rows.len()).collect();
    (0..width(rows)).all(|f| feature_range(rows, &indices, f).is_none())
}

/// `(min, max)` of a feature over the given rows, `None` if it does not vary.
fn feature_range(rows: &[Vec<f64>], indices: &[usize], f: usize) -> Option<(f64, f64)> {
    let (lo, hi) = indices.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), &i| {
            let v = feature(&rows[i], f);
            (lo.min(v), hi.max(v))
        },
    );
    (lo.is_finite() && hi.is_finite() && hi > lo).then_some((lo, hi))
}

fn grow(
    rows: &[Vec<f64>],
    indices: Vec<usize>,
    depth: usize,
    depth_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= depth_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let candidates: Vec<(usize, f64, f64)> = (0..width(rows))
        .filter_map(|f| feature_range(rows, &indices, f).map(|(lo, hi)| (f, lo, hi)))
        .collect();
    if candidates.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature_index, lo, hi) = candidates[rng.random_range(0..candidates.len())];
    let value = rng.random_range(lo..hi);
    // `<=` keeps both sides non-empty: `lo` always goes left, `hi` always right.
    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .into_iter()
        .partition(|&i| feature(&rows[i], feature_index) <= value);

    Node::Split {
        feature: feature_index,
        value,
        left: Box::new(grow(rows, left, depth + 1, depth_limit, rng)),
        right: Box::new(grow(rows, right, depth + 1, depth_limit, rng)),
    }
}

fn path_length(root: &Node, row: &[f64]) -> f64 {
    let mut node = root;
    let mut depth = 0.0;
    loop {
        match node {
            Node::Leaf { size } => return depth + average_path_length(*size),
            Node::Split {
                feature: f,
                value,
                left,
                right,
            } => {
                node = if feature(row, *f) <= *value { left } else { right };
                depth += 1.0;
            }
        }
    }
}

/// Flag exactly `round(fraction * n)` rows with the highest scores.
/// Equal scores resolve to the earlier row.
fn top_fraction(scores: &[f64], fraction: f64) -> Vec<bool> {
    let n = scores.len();
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let k = ((fraction.clamp(0.0, 1.0) * n as f64).round() as usize).min(n);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

    let mut flags = vec![false; n];
    for &i in order.iter().take(k) {
        flags[i] = true;
    }
    flags
}
