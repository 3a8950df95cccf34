//! Similarity and distance helpers shared by every pipeline stage.

use serde::{Deserialize, Serialize};

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Distance metric used by the reducer and the clusterer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    ///
    /// Cosine distance is `1 - cosine_similarity`, so it lies in `[0, 2]`.
    #[must_use]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Cosine => (1.0 - cosine_similarity(a, b)).max(0.0),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "cosine" => Ok(Self::Cosine),
            other => Err(format!(
                "unknown metric '{other}', expected 'euclidean' or 'cosine'"
            )),
        }
    }
}

/// Calculates cosine similarity between two vectors.
///
/// Returns a value between -1 and 1, where 1 means identical direction.
/// Zero vectors have similarity 0 with everything.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Dot product of two vectors of equal length.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalizes a vector to unit length in place.
pub fn normalize_vector(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Returns a unit-length copy of the vector.
#[must_use]
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut copy = vector.to_vec();
    normalize_vector(&mut copy);
    copy
}

/// Mean of the given rows, accumulated in f64.
///
/// Returns `None` for an empty iterator.
pub fn mean_vector<'a>(rows: impl IntoIterator<Item = &'a [f32]>, dim: usize) -> Option<Vec<f32>> {
    let mut sum = vec![0.0f64; dim];
    let mut count = 0usize;
    for row in rows {
        for (acc, &x) in sum.iter_mut().zip(row) {
            *acc += f64::from(x);
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(sum.into_iter().map(|x| (x / count as f64) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let c = vec![2.0, 0.0, 0.0];

        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_similarity(&a, &c) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_metric_distances() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((DistanceMetric::Euclidean.distance(&a, &b) - 5.0).abs() < 1e-6);

        let x = [1.0, 0.0];
        let y = [-1.0, 0.0];
        assert!((DistanceMetric::Cosine.distance(&x, &y) - 2.0).abs() < 1e-6);
        assert_eq!("COSINE".parse::<DistanceMetric>(), Ok(DistanceMetric::Cosine));
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_mean_vector() {
        let rows = [vec![1.0, 2.0], vec![3.0, 4.0]];
        let mean = mean_vector(rows.iter().map(|r| r.as_slice()), 2).unwrap();
        assert_eq!(mean, vec![2.0, 3.0]);
        assert!(mean_vector(std::iter::empty(), 2).is_none());
    }
}
