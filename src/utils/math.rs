//! Statistical primitives shared by the detectors.
//!
//! All dispersion measures are population statistics (ddof = 0) and
//! percentiles use linear interpolation between closest ranks.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

/// Calculate the arithmetic mean; `None` for an empty series.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Calculate the population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Absolute z-score of `value`; zero when the series has no spread.
pub fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    // Rounding noise on a constant series must not turn into a huge z-score.
    if std_dev <= f64::EPSILON * mean.abs().max(1.0) {
        return 0.0;
    }
    (value - mean).abs() / std_dev
}

/// Percentile `p` (0-100) with linear interpolation.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(percentile_sorted(&sorted, p))
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Percentage of `values` that are less than or equal to `value`.
pub fn percentile_rank(values: &[f64], value: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let below = values.iter().filter(|v| **v <= value).count();
    Some(below as f64 / values.len() as f64 * 100.0)
}

/// Tukey fences around the interquartile range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Calculate `Q1 - 1.5 * IQR` and `Q3 + 1.5 * IQR`.
pub fn iqr_bounds(values: &[f64]) -> Option<IqrBounds> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = percentile_sorted(&sorted, 25.0);
    let q3 = percentile_sorted(&sorted, 75.0);
    let iqr = q3 - q1;
    Some(IqrBounds {
        q1,
        q3,
        lower: q1 - 1.5 * iqr,
        upper: q3 + 1.5 * iqr,
    })
}

/// Herfindahl-Hirschman index over market shares (each in 0..=1).
pub fn herfindahl_index(shares: &[f64]) -> f64 {
    shares.iter().map(|s| s * s).sum()
}

/// HHI computed from raw per-participant counts or values.
pub fn herfindahl_from_totals(totals: &[f64]) -> f64 {
    let sum: f64 = totals.iter().sum();
    if sum <= 0.0 {
        return 0.0;
    }
    let shares: Vec<f64> = totals.iter().map(|t| t / sum).collect();
    herfindahl_index(&shares)
}

/// Sum of the `n` largest shares.
pub fn top_n_share(totals: &[f64], n: usize) -> f64 {
    let sum: f64 = totals.iter().sum();
    if sum <= 0.0 {
        return 0.0;
    }
    let mut sorted = totals.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted.iter().take(n).sum::<f64>() / sum
}

/// Parameters of the one-dimensional isolation forest.
#[derive(Debug, Clone, Copy)]
pub struct IsolationParams {
    pub trees: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for IsolationParams {
    fn default() -> Self {
        Self {
            trees: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsolationOutcome {
    /// Anomaly score of the target in (0, 1]; higher is more isolated.
    pub score: f64,
    /// Share of scored points at least as anomalous as the target.
    pub fraction: f64,
    pub is_anomaly: bool,
}

enum IsoNode {
    Leaf { size: usize },
    Split { threshold: f64, left: Box<IsoNode>, right: Box<IsoNode> },
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + 0.577_215_664_901_532_9) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build_tree(points: &mut [f64], depth: usize, limit: usize, rng: &mut StdRng) -> IsoNode {
    let min = points.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = points.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if depth >= limit || points.len() <= 1 || min >= max {
        return IsoNode::Leaf { size: points.len() };
    }
    let threshold = rng.gen_range(min..max);
    points.sort_by(|a, b| a.total_cmp(b));
    let split = points.partition_point(|p| *p < threshold);
    let (left, right) = points.split_at_mut(split);
    IsoNode::Split {
        threshold,
        left: Box::new(build_tree(left, depth + 1, limit, rng)),
        right: Box::new(build_tree(right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &IsoNode, value: f64, depth: usize) -> f64 {
    match node {
        IsoNode::Leaf { size } => depth as f64 + average_path_length(*size),
        IsoNode::Split { threshold, left, right } => {
            if value < *threshold {
                path_length(left, value, depth + 1)
            } else {
                path_length(right, value, depth + 1)
            }
        }
    }
}

/// Scores `target` against `reference` with a seeded isolation forest.
///
/// The forest is fitted on the reference points plus the target, every point
/// is scored, and the target is an anomaly when the share of points at least
/// as anomalous as it does not exceed `contamination`. Identical inputs
/// always produce identical outcomes.
pub fn isolation_anomaly(
    reference: &[f64],
    target: f64,
    contamination: f64,
    params: IsolationParams,
) -> Option<IsolationOutcome> {
    if reference.is_empty() || !target.is_finite() {
        return None;
    }
    let mut data: Vec<f64> = reference.iter().cloned().filter(|v| v.is_finite()).collect();
    data.push(target);

    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min >= max {
        return Some(IsolationOutcome {
            score: 0.5,
            fraction: 1.0,
            is_anomaly: false,
        });
    }

    let sample_size = data.len().min(params.max_samples.max(2));
    let limit = (sample_size as f64).log2().ceil() as usize;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let trees: Vec<IsoNode> = (0..params.trees.max(1))
        .map(|_| {
            let mut points: Vec<f64> = sample(&mut rng, data.len(), sample_size)
                .into_iter()
                .map(|i| data[i])
                .collect();
            build_tree(&mut points, 0, limit, &mut rng)
        })
        .collect();

    let normaliser = average_path_length(sample_size);
    let score_of = |value: f64| {
        let avg = trees.iter().map(|t| path_length(t, value, 0)).sum::<f64>() / trees.len() as f64;
        2f64.powf(-avg / normaliser)
    };

    let target_score = score_of(target);
    let at_least_as_anomalous = data
        .iter()
        .filter(|v| score_of(**v) >= target_score - 1e-12)
        .count();
    let fraction = at_least_as_anomalous as f64 / data.len() as f64;

    Some(IsolationOutcome {
        score: target_score,
        fraction,
        is_anomaly: fraction <= contamination,
    })
}

/// Round to a fixed number of decimals for reporting.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
