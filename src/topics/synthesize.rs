//! Topics from clusters: centroids, near-duplicate merging and keywords.

use crate::cluster::ClusterAssignment;
use crate::error::{TopicError, TopicResult};
use crate::store::Vocabulary;
use crate::topics::keywords::Keyword;
use crate::types::{ClusterLabel, TopicId};
use crate::vector::{Matrix, VectorError, cosine_similarity};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Topic merge parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Topics whose centroid cosine similarity exceeds `1 - merge_delta`
    /// are merged.
    pub merge_delta: f32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { merge_delta: 0.1 }
    }
}

impl MergeConfig {
    pub fn validate(&self) -> TopicResult<()> {
        if !(0.0..=1.0).contains(&self.merge_delta) {
            return Err(TopicError::invalid_parameter(
                "topics.merge_delta",
                self.merge_delta,
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }

    fn threshold(&self) -> f32 {
        1.0 - self.merge_delta
    }
}

/// One discovered topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    /// Number of documents clustered into this topic.
    pub size: usize,
    /// Clusterer ids merged into this topic, ascending.
    pub clusters: Vec<usize>,
    pub centroid: Vec<f32>,
    /// Ranked by descending score.
    pub keywords: Vec<Keyword>,
}

impl Topic {
    /// First `n` keyword strings.
    pub fn top_words(&self, n: usize) -> Vec<&str> {
        self.keywords.iter().take(n).map(|k| k.word.as_str()).collect()
    }
}

/// Topics of a model, indexed by [`TopicId`], plus the cluster mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSet {
    topics: Vec<Topic>,
    cluster_topics: Vec<TopicId>,
}

impl TopicSet {
    pub fn new(topics: Vec<Topic>, cluster_topics: Vec<TopicId>) -> TopicResult<Self> {
        for (position, topic) in topics.iter().enumerate() {
            if topic.id.value() != position {
                return Err(TopicError::MalformedInput {
                    origin: "topic set".to_string(),
                    reason: format!("topic at position {position} has id {}", topic.id),
                });
            }
        }
        if let Some(bad) = cluster_topics.iter().find(|t| t.value() >= topics.len()) {
            return Err(TopicError::TopicNotFound {
                topic: bad.value(),
                available: topics.len(),
            });
        }
        Ok(Self {
            topics,
            cluster_topics,
        })
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn get(&self, id: TopicId) -> Option<&Topic> {
        self.topics.get(id.value())
    }

    pub fn topic(&self, id: TopicId) -> TopicResult<&Topic> {
        self.get(id).ok_or(TopicError::TopicNotFound {
            topic: id.value(),
            available: self.topics.len(),
        })
    }

    /// Topic that absorbed a clusterer label; `None` for noise.
    pub fn topic_for_label(&self, label: ClusterLabel) -> Option<TopicId> {
        label.id().and_then(|c| self.cluster_topics.get(c).copied())
    }

    pub fn cluster_topics(&self) -> &[TopicId] {
        &self.cluster_topics
    }
}

/// Vocabulary ranked by cosine similarity to `query`.
///
/// Ties keep vocabulary order. `skip` positions are left out.
pub fn rank_keywords(
    query: &[f32],
    vocabulary: &Vocabulary,
    limit: usize,
    skip: &[usize],
) -> Vec<Keyword> {
    let mut scored: Vec<(usize, f32)> = (0..vocabulary.len())
        .into_par_iter()
        .filter(|i| !skip.contains(i))
        .map(|i| (i, cosine_similarity(vocabulary.vector(i), query)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored
        .into_iter()
        .take(limit)
        .map(|(i, score)| Keyword::new(vocabulary.token(i), score))
        .collect()
}

/// Clusters being merged into one topic.
#[derive(Debug, Clone)]
struct Group {
    clusters: Vec<usize>,
    size: usize,
    centroid: Vec<f32>,
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

/// Merge groups whose centroids are closer than the threshold until no pair is.
fn merge_groups(mut groups: Vec<Group>, threshold: f32) -> Vec<Group> {
    loop {
        let mut parent: Vec<usize> = (0..groups.len()).collect();
        let mut merged_any = false;
        for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                if cosine_similarity(&groups[i].centroid, &groups[j].centroid) > threshold {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    if ri != rj {
                        parent[ri.max(rj)] = ri.min(rj);
                        merged_any = true;
                    }
                }
            }
        }
        if !merged_any {
            return groups;
        }

        let mut combined: Vec<Option<Group>> = vec![None; groups.len()];
        for (i, group) in groups.into_iter().enumerate() {
            let root = find(&mut parent, i);
            combined[root] = Some(match combined[root].take() {
                None => group,
                Some(acc) => combine(acc, group),
            });
        }
        groups = combined.into_iter().flatten().collect();
        debug!(groups = groups.len(), "merged near-duplicate topics");
    }
}

/// Size-weighted mean of two groups.
fn combine(a: Group, b: Group) -> Group {
    let total = a.size + b.size;
    let (wa, wb) = (
        a.size as f64 / total as f64,
        b.size as f64 / total as f64,
    );
    let centroid = a
        .centroid
        .iter()
        .zip(&b.centroid)
        .map(|(x, y)| (f64::from(*x) * wa + f64::from(*y) * wb) as f32)
        .collect();
    let mut clusters = a.clusters;
    clusters.extend(b.clusters);
    clusters.sort_unstable();
    Group {
        clusters,
        size: total,
        centroid,
    }
}

/// Builds the topic set of a model.
#[derive(Debug, Clone)]
pub struct TopicSynthesizer {
    merge: MergeConfig,
    max_keywords: usize,
}

impl TopicSynthesizer {
    pub fn new(merge: MergeConfig, max_keywords: usize) -> TopicResult<Self> {
        merge.validate()?;
        if max_keywords == 0 {
            return Err(TopicError::invalid_parameter(
                "topics.max_keywords",
                max_keywords,
                "must be at least 1",
            ));
        }
        Ok(Self {
            merge,
            max_keywords,
        })
    }

    /// Deterministic: identical inputs give identical topics.
    pub fn synthesize(
        &self,
        clusters: &ClusterAssignment,
        vectors: &Matrix,
        vocabulary: &Vocabulary,
    ) -> TopicResult<TopicSet> {
        if clusters.len() != vectors.rows() {
            return Err(TopicError::misaligned(
                "cluster labels",
                vectors.rows(),
                clusters.len(),
            ));
        }
        if vocabulary.dim() != vectors.dim() {
            return Err(VectorError::DimensionMismatch {
                expected: vectors.dim(),
                actual: vocabulary.dim(),
            }
            .into());
        }
        if clusters.n_clusters() == 0 {
            return Err(TopicError::NoTopicsFound {
                documents: vectors.rows(),
            });
        }

        let mut groups = Vec::with_capacity(clusters.n_clusters());
        for cluster in 0..clusters.n_clusters() {
            let members = clusters.members(cluster);
            let centroid = crate::vector::mean_vector(
                members.iter().map(|&i| vectors.row(i)),
                vectors.dim(),
            )
            .ok_or(TopicError::EmptyCluster { cluster })?;
            groups.push(Group {
                clusters: vec![cluster],
                size: members.len(),
                centroid,
            });
        }

        let mut groups = merge_groups(groups, self.merge.threshold());
        groups.sort_by(|a, b| b.size.cmp(&a.size).then(a.clusters[0].cmp(&b.clusters[0])));

        let mut cluster_topics = vec![TopicId(0); clusters.n_clusters()];
        let topics: Vec<Topic> = groups
            .into_iter()
            .enumerate()
            .map(|(position, group)| {
                let id = TopicId(position);
                for &cluster in &group.clusters {
                    cluster_topics[cluster] = id;
                }
                Topic {
                    id,
                    size: group.size,
                    keywords: rank_keywords(&group.centroid, vocabulary, self.max_keywords, &[]),
                    clusters: group.clusters,
                    centroid: group.centroid,
                }
            })
            .collect();

        info!(
            clusters = clusters.n_clusters(),
            topics = topics.len(),
            merge_delta = self.merge.merge_delta,
            "synthesized topics"
        );
        TopicSet::new(topics, cluster_topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> Vocabulary {
        Vocabulary::new(
            vec!["inflación".into(), "empleo".into(), "petróleo".into(), "precios".into()],
            Matrix::from_rows(vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![0.9, 0.1, 0.0],
            ])
            .unwrap(),
        )
        .unwrap()
    }

    /// Four clusters: 0 and 1 nearly parallel, 2 about 45 degrees from 0, 3 orthogonal.
    fn fixture() -> (ClusterAssignment, Matrix) {
        let rows = vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.02, 0.0],
            vec![0.98, 0.05, 0.0],
            vec![1.0, 0.06, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![0.9, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 0.1, 1.0],
            vec![0.0, 0.0, 1.0],
            vec![0.5, 0.5, 0.5],
        ];
        let labels = [0, 0, 1, 1, 2, 2, 3, 3, 3, -1]
            .into_iter()
            .map(ClusterLabel::from)
            .collect();
        (
            ClusterAssignment::from_labels(labels).unwrap(),
            Matrix::from_rows(rows).unwrap(),
        )
    }

    fn synthesize(delta: f32) -> TopicSet {
        let (clusters, vectors) = fixture();
        TopicSynthesizer::new(MergeConfig { merge_delta: delta }, 3)
            .unwrap()
            .synthesize(&clusters, &vectors, &vocabulary())
            .unwrap()
    }

    #[test]
    fn test_near_duplicate_clusters_merge() {
        let topics = synthesize(0.1);
        assert_eq!(topics.len(), 3);

        let largest = &topics.topics()[0];
        assert_eq!(largest.clusters, vec![0, 1]);
        assert_eq!(largest.size, 4);
        assert_eq!(largest.keywords[0].word, "inflación");
        assert_eq!(topics.topic_for_label(ClusterLabel::cluster(1)), Some(TopicId(0)));
        assert_eq!(topics.topic_for_label(ClusterLabel::NOISE), None);

        // ordered by size: cluster 3 has three documents, cluster 2 has two
        assert_eq!(topics.topics()[1].clusters, vec![3]);
        assert_eq!(topics.topics()[2].clusters, vec![2]);
    }

    #[test]
    fn test_synthesize_is_idempotent() {
        let first = synthesize(0.1);
        let second = synthesize(0.1);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_larger_delta_never_adds_topics() {
        let counts: Vec<usize> = [0.0, 0.05, 0.1, 0.2, 0.35, 0.6, 1.0]
            .into_iter()
            .map(|delta| synthesize(delta).len())
            .collect();
        assert!(counts.windows(2).all(|w| w[1] <= w[0]), "{counts:?}");
        assert_eq!(counts[0], 4);
        assert_eq!(*counts.last().unwrap(), 1);
    }

    #[test]
    fn test_keywords_are_ranked_and_capped() {
        let topics = synthesize(0.1);
        for topic in topics.topics() {
            assert!(topic.keywords.len() <= 3);
            assert!(topic.keywords.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[test]
    fn test_no_clusters_is_an_error() {
        let labels = vec![ClusterLabel::NOISE; 3];
        let vectors = Matrix::from_rows(vec![vec![1.0, 0.0, 0.0]; 3]).unwrap();
        let result = TopicSynthesizer::new(MergeConfig::default(), 5)
            .unwrap()
            .synthesize(&ClusterAssignment::from_labels(labels).unwrap(), &vectors, &vocabulary());
        assert!(matches!(result, Err(TopicError::NoTopicsFound { documents: 3 })));
    }

    #[test]
    fn test_rank_keywords_breaks_ties_by_vocabulary_order() {
        let vocab = Vocabulary::new(
            vec!["b".into(), "a".into()],
            Matrix::from_rows(vec![vec![1.0, 0.0], vec![1.0, 0.0]]).unwrap(),
        )
        .unwrap();
        let ranked = rank_keywords(&[1.0, 0.0], &vocab, 5, &[]);
        assert_eq!(ranked[0].word, "b");
        assert_eq!(ranked[1].word, "a");
    }
}
