//! Density-based clustering of the reduced embeddings.
//!
//! The number of clusters is discovered from density connectivity; there is
//! no cluster-count parameter. Points in low-density regions are labelled
//! [`ClusterLabel::NOISE`].

mod hdbscan;

use crate::error::{TopicError, TopicResult};
use crate::types::ClusterLabel;
use crate::vector::{DistanceMetric, Matrix};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// How clusters are extracted from the condensed tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterSelection {
    /// Excess of mass: the most stable clusters across the hierarchy.
    #[default]
    Eom,
    /// Leaves of the condensed tree, finer grained.
    Leaf,
}

impl std::str::FromStr for ClusterSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eom" => Ok(Self::Eom),
            "leaf" => Ok(Self::Leaf),
            other => Err(format!("unknown cluster selection '{other}', expected 'eom' or 'leaf'")),
        }
    }
}

/// Clusterer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClustererConfig {
    /// Smallest group of documents that counts as a cluster.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Neighbourhood size for core distances, the point itself included.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default)]
    pub metric: DistanceMetric,

    #[serde(default)]
    pub selection: ClusterSelection,

    /// Allow the whole dataset to come back as one cluster.
    #[serde(default)]
    pub allow_single_cluster: bool,
}

fn default_min_cluster_size() -> usize {
    50
}
fn default_min_samples() -> usize {
    25
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            min_samples: default_min_samples(),
            metric: DistanceMetric::Euclidean,
            selection: ClusterSelection::Eom,
            allow_single_cluster: false,
        }
    }
}

impl ClustererConfig {
    pub fn validate(&self) -> TopicResult<()> {
        if self.min_cluster_size < 2 {
            return Err(TopicError::invalid_parameter(
                "clusterer.min_cluster_size",
                self.min_cluster_size,
                "must be at least 2",
            ));
        }
        if self.min_samples < 1 {
            return Err(TopicError::invalid_parameter(
                "clusterer.min_samples",
                self.min_samples,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn validate_for(&self, rows: usize) -> TopicResult<()> {
        self.validate()?;
        if self.min_samples >= rows {
            return Err(TopicError::invalid_parameter(
                "clusterer.min_samples",
                self.min_samples,
                format!("must be smaller than the number of documents ({rows})"),
            ));
        }
        Ok(())
    }
}

/// Cluster label per input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    labels: Vec<ClusterLabel>,
    n_clusters: usize,
}

impl ClusterAssignment {
    /// Wrap raw labels; cluster ids must be dense from 0.
    pub fn from_labels(labels: Vec<ClusterLabel>) -> TopicResult<Self> {
        let n_clusters = labels
            .iter()
            .filter_map(ClusterLabel::id)
            .max()
            .map_or(0, |max| max + 1);
        let mut seen = vec![false; n_clusters];
        for id in labels.iter().filter_map(ClusterLabel::id) {
            seen[id] = true;
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(TopicError::EmptyCluster { cluster: missing });
        }
        Ok(Self { labels, n_clusters })
    }

    pub fn labels(&self) -> &[ClusterLabel] {
        &self.labels
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_noise()).count()
    }

    /// Row indices labelled with `cluster`, ascending.
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| label.id() == Some(cluster))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for id in self.labels.iter().filter_map(ClusterLabel::id) {
            sizes[id] += 1;
        }
        sizes
    }
}

/// HDBSCAN over a matrix of reduced embeddings.
///
/// Deterministic: no randomness, and every ordering step is a stable sort or
/// a lowest-index tie-break.
#[derive(Debug, Clone)]
pub struct DensityClusterer {
    config: ClustererConfig,
}

impl DensityClusterer {
    pub fn new(config: ClustererConfig) -> TopicResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClustererConfig {
        &self.config
    }

    pub fn cluster(&self, points: &Matrix) -> TopicResult<ClusterAssignment> {
        let config = &self.config;
        config.validate_for(points.rows())?;
        let start = Instant::now();
        info!(
            points = points.rows(),
            min_cluster_size = config.min_cluster_size,
            min_samples = config.min_samples,
            selection = ?config.selection,
            "clustering reduced embeddings"
        );

        let labels = hdbscan::run(points, config);
        let assignment = ClusterAssignment::from_labels(labels)?;

        info!(
            clusters = assignment.n_clusters(),
            noise = assignment.noise_count(),
            elapsed_ms = start.elapsed().as_millis(),
            "clustering finished"
        );
        Ok(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{axis, blobs};

    fn config(min_cluster_size: usize, min_samples: usize) -> ClustererConfig {
        ClustererConfig {
            min_cluster_size,
            min_samples,
            ..ClustererConfig::default()
        }
    }

    #[test]
    fn test_min_cluster_size_boundary() {
        // blobs of 15, 10 and 9 points; the third sits far from the others
        let centers = vec![axis(3, 0, 0.0), axis(3, 0, 10.0), axis(3, 0, 100.0)];
        let points = blobs(&centers, &[15, 10, 9], 0.3, 11);
        let clusterer = DensityClusterer::new(config(10, 3)).unwrap();

        let assignment = clusterer.cluster(&points).unwrap();
        assert_eq!(assignment.n_clusters(), 2);

        let mut sizes = assignment.sizes();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![10, 15]);
        assert!(assignment.labels()[25..].iter().all(ClusterLabel::is_noise));

        let first = assignment.labels()[0];
        assert!(assignment.labels()[..15].iter().all(|l| *l == first));
    }

    #[test]
    fn test_cluster_is_deterministic() {
        let centers = vec![axis(4, 0, 0.0), axis(4, 1, 6.0), axis(4, 2, 12.0)];
        let points = blobs(&centers, &[20, 25, 18], 0.5, 3);
        let clusterer = DensityClusterer::new(config(8, 4)).unwrap();

        let first = clusterer.cluster(&points).unwrap();
        let second = clusterer.cluster(&points).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.n_clusters(), 3);
    }

    #[test]
    fn test_leaf_selection_keeps_sub_clusters() {
        // two nearby sub-blobs and one distant blob
        let centers = vec![axis(2, 0, 0.0), axis(2, 0, 4.0), axis(2, 1, 60.0)];
        let points = blobs(&centers, &[12, 12, 12], 0.2, 5);
        let clusterer = DensityClusterer::new(ClustererConfig {
            selection: ClusterSelection::Leaf,
            ..config(10, 3)
        })
        .unwrap();

        let assignment = clusterer.cluster(&points).unwrap();
        assert_eq!(assignment.n_clusters(), 3);
    }

    #[test]
    fn test_labels_are_dense() {
        let centers = vec![axis(2, 0, 0.0), axis(2, 1, 20.0)];
        let points = blobs(&centers, &[12, 12], 0.3, 9);
        let assignment = DensityClusterer::new(config(5, 3))
            .unwrap()
            .cluster(&points)
            .unwrap();
        for cluster in 0..assignment.n_clusters() {
            assert!(!assignment.members(cluster).is_empty());
        }
    }

    #[test]
    fn test_parameter_validation() {
        assert!(matches!(
            DensityClusterer::new(config(1, 1)),
            Err(TopicError::InvalidParameter { parameter, .. }) if parameter == "clusterer.min_cluster_size"
        ));
        assert!(DensityClusterer::new(config(5, 0)).is_err());

        let points = blobs(&[axis(2, 0, 0.0)], &[5], 0.1, 1);
        let clusterer = DensityClusterer::new(config(2, 5)).unwrap();
        assert!(matches!(
            clusterer.cluster(&points),
            Err(TopicError::InvalidParameter { parameter, .. }) if parameter == "clusterer.min_samples"
        ));
    }

    #[test]
    fn test_from_labels_rejects_gaps() {
        let labels = vec![ClusterLabel::cluster(0), ClusterLabel::cluster(2)];
        assert!(matches!(
            ClusterAssignment::from_labels(labels),
            Err(TopicError::EmptyCluster { cluster: 1 })
        ));
    }
}
