//! Dimensionality reduction of document embeddings.
//!
//! A compact UMAP: exact k-nearest-neighbour graph, fuzzy simplicial set
//! weights, seeded random-projection initialisation and stochastic gradient
//! descent on the low-dimensional layout. All randomness comes from one
//! `StdRng` seeded with `random_state`, so the output is reproducible.

use crate::error::{TopicError, TopicResult};
use crate::vector::{DistanceMetric, Matrix, dot, euclidean_distance, normalized};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

const SIGMA_SEARCH_STEPS: usize = 64;
const SIGMA_TOLERANCE: f32 = 1e-5;
const MIN_SIGMA_SCALE: f32 = 1e-3;
const GRADIENT_CLIP: f32 = 4.0;
const INIT_SCALE: f32 = 10.0;

/// Reducer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducerConfig {
    /// Size of the local neighbourhood.
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,

    /// Target dimensionality.
    #[serde(default = "default_n_components")]
    pub n_components: usize,

    /// Metric in the input space.
    #[serde(default = "default_metric")]
    pub metric: DistanceMetric,

    #[serde(default = "default_random_state")]
    pub random_state: u64,

    #[serde(default = "default_n_epochs")]
    pub n_epochs: usize,

    /// Minimum distance between points in the layout.
    #[serde(default = "default_min_dist")]
    pub min_dist: f32,

    /// Repulsive samples per attractive update.
    #[serde(default = "default_negative_sample_rate")]
    pub negative_sample_rate: usize,
}

fn default_n_neighbors() -> usize {
    50
}
fn default_n_components() -> usize {
    5
}
fn default_metric() -> DistanceMetric {
    DistanceMetric::Cosine
}
fn default_random_state() -> u64 {
    42
}
fn default_n_epochs() -> usize {
    200
}
fn default_min_dist() -> f32 {
    0.1
}
fn default_negative_sample_rate() -> usize {
    5
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            n_neighbors: default_n_neighbors(),
            n_components: default_n_components(),
            metric: default_metric(),
            random_state: default_random_state(),
            n_epochs: default_n_epochs(),
            min_dist: default_min_dist(),
            negative_sample_rate: default_negative_sample_rate(),
        }
    }
}

impl ReducerConfig {
    /// Checks that do not depend on the input.
    pub fn validate(&self) -> TopicResult<()> {
        if self.n_neighbors < 2 {
            return Err(TopicError::invalid_parameter(
                "reducer.n_neighbors",
                self.n_neighbors,
                "must be at least 2",
            ));
        }
        if self.n_components < 1 {
            return Err(TopicError::invalid_parameter(
                "reducer.n_components",
                self.n_components,
                "must be at least 1",
            ));
        }
        if self.n_epochs < 1 {
            return Err(TopicError::invalid_parameter(
                "reducer.n_epochs",
                self.n_epochs,
                "must be at least 1",
            ));
        }
        if !(self.min_dist >= 0.0 && self.min_dist < 1.0) {
            return Err(TopicError::invalid_parameter(
                "reducer.min_dist",
                self.min_dist,
                "must be in [0, 1)",
            ));
        }
        Ok(())
    }

    /// Full validation against an input of `rows` vectors of dimension `dim`.
    pub fn validate_for(&self, rows: usize, dim: usize) -> TopicResult<()> {
        self.validate()?;
        if self.n_neighbors > rows.saturating_sub(1) {
            return Err(TopicError::invalid_parameter(
                "reducer.n_neighbors",
                self.n_neighbors,
                format!("must be at most the number of documents minus one ({})", rows.saturating_sub(1)),
            ));
        }
        if self.n_components >= dim {
            return Err(TopicError::invalid_parameter(
                "reducer.n_components",
                self.n_components,
                format!("must be smaller than the embedding dimension ({dim})"),
            ));
        }
        Ok(())
    }
}

/// Weighted undirected edge of the neighbour graph, `head < tail`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Edge {
    head: usize,
    tail: usize,
    weight: f32,
}

/// Projects document embeddings into a low-dimensional layout.
#[derive(Debug, Clone)]
pub struct DimensionalityReducer {
    config: ReducerConfig,
}

impl DimensionalityReducer {
    pub fn new(config: ReducerConfig) -> TopicResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    /// Row `i` of the output is the layout position of row `i` of the input.
    pub fn fit_transform(&self, vectors: &Matrix) -> TopicResult<Matrix> {
        let config = &self.config;
        config.validate_for(vectors.rows(), vectors.dim())?;
        info!(
            documents = vectors.rows(),
            input_dim = vectors.dim(),
            output_dim = config.n_components,
            n_neighbors = config.n_neighbors,
            metric = ?config.metric,
            "reducing embeddings"
        );

        let neighbors = nearest_neighbors(vectors, config.n_neighbors, config.metric);
        let edges = fuzzy_edges(&neighbors, config.n_neighbors);
        debug!(edges = edges.len(), "built fuzzy neighbour graph");

        let mut rng = StdRng::seed_from_u64(config.random_state);
        let mut layout = random_projection(vectors, config.n_components, &mut rng)?;
        let (a, b) = fit_curve(config.min_dist);
        debug!(a, b, "fitted layout curve");

        optimize_layout(&mut layout, &edges, a, b, config, &mut rng);
        info!(documents = layout.rows(), "reduction finished");
        Ok(layout)
    }
}

/// Exact kNN lists, self excluded, ascending by (distance, index).
fn nearest_neighbors(vectors: &Matrix, k: usize, metric: DistanceMetric) -> Vec<Vec<(usize, f32)>> {
    let unit: Option<Matrix> = match metric {
        DistanceMetric::Cosine => {
            let mut unit = vectors.clone();
            for i in 0..unit.rows() {
                let row = normalized(unit.row(i));
                unit.row_mut(i).copy_from_slice(&row);
            }
            Some(unit)
        }
        DistanceMetric::Euclidean => None,
    };
    let distance = |i: usize, j: usize| match &unit {
        Some(unit) => (1.0 - dot(unit.row(i), unit.row(j))).max(0.0),
        None => euclidean_distance(vectors.row(i), vectors.row(j)),
    };

    (0..vectors.rows())
        .into_par_iter()
        .map(|i| {
            let mut row: Vec<(usize, f32)> = (0..vectors.rows())
                .filter(|&j| j != i)
                .map(|j| (j, distance(i, j)))
                .collect();
            row.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            row.truncate(k);
            row
        })
        .collect()
}

/// Membership strengths from the kNN lists, symmetrised with the fuzzy union.
fn fuzzy_edges(neighbors: &[Vec<(usize, f32)>], k: usize) -> Vec<Edge> {
    let target = (k as f32).log2();
    let mean_distance = {
        let (sum, count) = neighbors
            .iter()
            .flatten()
            .fold((0.0f64, 0usize), |(s, c), (_, d)| (s + *d as f64, c + 1));
        if count == 0 { 0.0 } else { (sum / count as f64) as f32 }
    };

    let mut directed: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (i, row) in neighbors.iter().enumerate() {
        let distances: Vec<f32> = row.iter().map(|(_, d)| *d).collect();
        let rho = distances.iter().copied().find(|d| *d > 0.0).unwrap_or(0.0);
        let sigma = smooth_sigma(&distances, rho, target).max(MIN_SIGMA_SCALE * mean_distance);
        for &(j, d) in row {
            let weight = if sigma > 0.0 {
                (-((d - rho).max(0.0)) / sigma).exp()
            } else {
                1.0
            };
            directed.insert((i, j), weight);
        }
    }

    let mut undirected: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let key = (i.min(j), i.max(j));
        if undirected.contains_key(&key) {
            continue;
        }
        let reverse = directed.get(&(j, i)).copied().unwrap_or(0.0);
        undirected.insert(key, w + reverse - w * reverse);
    }

    undirected
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|((head, tail), weight)| Edge { head, tail, weight })
        .collect()
}

/// Binary search for the bandwidth whose membership sum equals `target`.
fn smooth_sigma(distances: &[f32], rho: f32, target: f32) -> f32 {
    let (mut lo, mut hi, mut mid) = (0.0f32, f32::INFINITY, 1.0f32);
    for _ in 0..SIGMA_SEARCH_STEPS {
        let sum: f32 = distances
            .iter()
            .map(|d| {
                let excess = d - rho;
                if excess > 0.0 { (-excess / mid).exp() } else { 1.0 }
            })
            .sum();
        if (sum - target).abs() < SIGMA_TOLERANCE {
            break;
        }
        if sum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }
    mid
}

/// Seeded dense random projection, each output component rescaled to [0, 10].
fn random_projection(vectors: &Matrix, components: usize, rng: &mut StdRng) -> TopicResult<Matrix> {
    let scale = 1.0 / (components as f32).sqrt();
    let projection: Vec<f32> = (0..vectors.dim() * components)
        .map(|_| (rng.random::<f32>() * 2.0 - 1.0) * scale)
        .collect();

    let mut layout = Matrix::zeros(vectors.rows(), components)?;
    for i in 0..vectors.rows() {
        let input = vectors.row(i);
        let output = layout.row_mut(i);
        for (c, out) in output.iter_mut().enumerate() {
            *out = input
                .iter()
                .enumerate()
                .map(|(d, x)| x * projection[d * components + c])
                .sum();
        }
    }

    for c in 0..components {
        let (min, max) = (0..layout.rows()).fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), i| {
            let v = layout.row(i)[c];
            (lo.min(v), hi.max(v))
        });
        let range = max - min;
        for i in 0..layout.rows() {
            let v = &mut layout.row_mut(i)[c];
            *v = if range > 0.0 { (*v - min) / range * INIT_SCALE } else { 0.0 };
        }
    }
    Ok(layout)
}

/// Fit `1 / (1 + a d^(2b))` to the target membership curve for `min_dist`.
///
/// Coarse-to-fine grid search on squared error; spread is fixed at 1.
fn fit_curve(min_dist: f32) -> (f32, f32) {
    let samples: Vec<(f32, f32)> = (1..=300)
        .map(|i| {
            let x = i as f32 * 0.01;
            let y = if x < min_dist { 1.0 } else { (-(x - min_dist)).exp() };
            (x, y)
        })
        .collect();
    let error = |a: f32, b: f32| -> f32 {
        samples
            .iter()
            .map(|(x, y)| {
                let fit = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (fit - y) * (fit - y)
            })
            .sum()
    };

    let (a, b) = grid_search(&error, (0.05, 5.0), (0.3, 2.0), 80);
    let (a, b) = grid_search(&error, (a - 0.25, a + 0.25), (b - 0.08, b + 0.08), 50);
    let (a, b) = grid_search(&error, (a - 0.02, a + 0.02), (b - 0.01, b + 0.01), 20);
    (a.max(1e-3), b.max(1e-3))
}

fn grid_search(
    error: &dyn Fn(f32, f32) -> f32,
    a_range: (f32, f32),
    b_range: (f32, f32),
    steps: usize,
) -> (f32, f32) {
    let mut best = (a_range.0, b_range.0, f32::INFINITY);
    for ai in 0..=steps {
        let a = a_range.0 + (a_range.1 - a_range.0) * ai as f32 / steps as f32;
        if a <= 0.0 {
            continue;
        }
        for bi in 0..=steps {
            let b = b_range.0 + (b_range.1 - b_range.0) * bi as f32 / steps as f32;
            if b <= 0.0 {
                continue;
            }
            let e = error(a, b);
            if e < best.2 {
                best = (a, b, e);
            }
        }
    }
    (best.0, best.1)
}

fn clip(value: f32) -> f32 {
    value.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

fn optimize_layout(
    layout: &mut Matrix,
    edges: &[Edge],
    a: f32,
    b: f32,
    config: &ReducerConfig,
    rng: &mut StdRng,
) {
    let n = layout.rows();
    let dim = layout.dim();
    let max_weight = edges.iter().map(|e| e.weight).fold(0.0f32, f32::max);
    if n < 2 || max_weight <= 0.0 {
        return;
    }

    let mut head = vec![0.0f32; dim];
    let mut other = vec![0.0f32; dim];
    for epoch in 0..config.n_epochs {
        let alpha = 1.0 - epoch as f32 / config.n_epochs as f32;
        for edge in edges {
            if rng.random::<f32>() > edge.weight / max_weight {
                continue;
            }

            head.copy_from_slice(layout.row(edge.head));
            other.copy_from_slice(layout.row(edge.tail));
            let d2: f32 = head.iter().zip(&other).map(|(x, y)| (x - y) * (x - y)).sum();
            if d2 > 0.0 {
                let coefficient = -2.0 * a * b * d2.powf(b - 1.0) / (1.0 + a * d2.powf(b));
                for c in 0..dim {
                    let grad = clip(coefficient * (head[c] - other[c]));
                    head[c] += grad * alpha;
                    other[c] -= grad * alpha;
                }
            }
            layout.row_mut(edge.tail).copy_from_slice(&other);

            for _ in 0..config.negative_sample_rate {
                let sample = rng.random_range(0..n);
                if sample == edge.head {
                    continue;
                }
                let negative = layout.row(sample);
                let d2: f32 = head
                    .iter()
                    .zip(negative)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum();
                let coefficient = if d2 > 0.0 {
                    2.0 * b / ((0.001 + d2) * (1.0 + a * d2.powf(b)))
                } else {
                    0.0
                };
                for c in 0..dim {
                    let grad = if coefficient > 0.0 {
                        clip(coefficient * (head[c] - negative[c]))
                    } else {
                        GRADIENT_CLIP
                    };
                    head[c] += grad * alpha;
                }
            }
            layout.row_mut(edge.head).copy_from_slice(&head);
        }
    }
}
