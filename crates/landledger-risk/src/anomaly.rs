//! Unsupervised anomaly model.
//!
//! Feature vectors are standardized per dimension and scored by an
//! isolation forest: points that random axis-aligned splits isolate in few
//! steps are unusual.  The raw isolation score (0.5 ≈ ordinary, → 1 for
//! outliers) is passed through a logistic squash so the output reads as a
//! probability-like value in [0, 1].
//!
//! Training is seeded, so the same data and config always produce the same
//! forest.

use rand::{rngs::StdRng, seq::index::sample, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use landledger_contracts::error::{LedgerError, LedgerResult};

use crate::features::{FeatureVector, FEATURE_COUNT};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Standardized coordinates are kept within this many deviations of the
/// mean, so split ranges stay finite however extreme the raw inputs.
pub const STANDARD_BAND: f64 = 1e6;

/// Average unsuccessful-search path length in a binary search tree of `n`
/// nodes; normalizes isolation depths.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ── Standardization ───────────────────────────────────────────────────────────

/// Zero-mean, unit-variance scaling fitted on training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: [f64; FEATURE_COUNT],
    std_dev: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    pub fn fit(samples: &[FeatureVector]) -> LedgerResult<Self> {
        if samples.is_empty() {
            return Err(LedgerError::ModelError {
                reason: "cannot fit scaler on an empty sample".to_string(),
            });
        }
        let n = samples.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        let mut std_dev = [0.0; FEATURE_COUNT];

        for sample in samples {
            for (m, x) in mean.iter_mut().zip(sample.0) {
                *m += x / n;
            }
        }
        for sample in samples {
            for (i, x) in sample.0.iter().enumerate() {
                std_dev[i] += (x - mean[i]).powi(2) / n;
            }
        }
        for s in &mut std_dev {
            *s = s.sqrt();
            // A constant dimension carries no signal; leave it centered only.
            if !s.is_normal() {
                *s = 1.0;
            }
        }

        Ok(Self { mean, std_dev })
    }

    /// Standardize `v`, clamping every coordinate into `±STANDARD_BAND`.
    pub fn transform(&self, v: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            let z = (v.0[i] - self.mean[i]) / self.std_dev[i];
            out[i] = if z.is_nan() { 0.0 } else { z.clamp(-STANDARD_BAND, STANDARD_BAND) };
        }
        out
    }
}

// ── Isolation forest ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

impl Node {
    fn build(
        points: &[[f64; FEATURE_COUNT]],
        depth: usize,
        limit: usize,
        rng: &mut StdRng,
    ) -> Node {
        if depth >= limit || points.len() <= 1 {
            return Node::Leaf { size: points.len() };
        }

        // Only dimensions that still vary can split the points.
        let candidates: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
            .filter_map(|f| {
                let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, p| {
                    (acc.0.min(p[f]), acc.1.max(p[f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return Node::Leaf { size: points.len() };
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        // Interpolated rather than `lo..hi`: `hi - lo` overflows for wide finite bounds.
        let t: f64 = rng.gen();
        let threshold = lo * (1.0 - t) + hi * t;
        let (left, right): (Vec<_>, Vec<_>) =
            points.iter().copied().partition(|p| p[feature] < threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Node::build(&left, depth + 1, limit, rng)),
            right: Box::new(Node::build(&right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, point: &[f64; FEATURE_COUNT]) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split { feature, threshold, left, right } => {
                    node = if point[*feature] < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Ensemble of isolation trees over standardized feature vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<Node>,
    subsample: usize,
}

impl IsolationForest {
    /// Fit `trees` trees, each on a random subsample of `points`.
    pub fn fit(
        points: &[[f64; FEATURE_COUNT]],
        trees: usize,
        subsample: usize,
        seed: u64,
    ) -> LedgerResult<Self> {
        if points.len() < 2 {
            return Err(LedgerError::ModelError {
                reason: format!("isolation forest needs at least 2 samples, got {}", points.len()),
            });
        }

        let subsample = subsample.min(points.len());
        let depth_limit = (subsample as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..trees)
            .map(|_| {
                let picked: Vec<[f64; FEATURE_COUNT]> = sample(&mut rng, points.len(), subsample)
                    .into_iter()
                    .map(|i| points[i])
                    .collect();
                Node::build(&picked, 0, depth_limit, &mut rng)
            })
            .collect();

        Ok(Self { trees, subsample })
    }

    /// Raw isolation score in (0, 1]: `2^(-E[h(x)] / c(ψ))`.
    pub fn score(&self, point: &[f64; FEATURE_COUNT]) -> f64 {
        let norm = average_path_length(self.subsample);
        if self.trees.is_empty() || norm <= 0.0 {
            return 0.5;
        }
        let mean_depth =
            self.trees.iter().map(|t| t.path_length(point)).sum::<f64>() / self.trees.len() as f64;
        2f64.powf(-mean_depth / norm)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Monotonic logistic squash of a raw isolation score into [0, 1], centered
/// on the 0.5 "ordinary" midpoint.
pub fn squash(raw: f64, steepness: f64) -> f64 {
    let p = 1.0 / (1.0 + (-steepness * (raw - 0.5)).exp());
    p.clamp(0.0, 1.0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
