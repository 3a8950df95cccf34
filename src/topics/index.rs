//! Per-document topic assignments and the exploration queries built on them.

use crate::cluster::ClusterAssignment;
use crate::error::{TopicError, TopicResult};
use crate::store::{DocumentTable, Vocabulary};
use crate::topics::keywords::Keyword;
use crate::topics::synthesize::{TopicSet, rank_keywords};
use crate::topics::temporal::{Granularity, TemporalDistribution, TemporalOptions};
use crate::topics::Topic;
use crate::types::{DocumentId, TopicId};
use crate::vector::{VectorError, cosine_similarity};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Topic of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub doc_id: DocumentId,
    pub topic: TopicId,
    /// Cosine similarity between the document and the topic centroid.
    pub score: f32,
    /// The clusterer labelled this document as noise; it was attached to the
    /// nearest topic afterwards.
    pub outlier: bool,
}

/// A document returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentHit {
    /// Row in the model's document table.
    pub position: usize,
    pub doc_id: DocumentId,
    pub topic: TopicId,
    pub score: f32,
    pub published: NaiveDateTime,
}

/// A topic returned by a keyword search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicHit {
    pub topic: TopicId,
    pub score: f32,
    pub size: usize,
}

/// Index over the documents, vocabulary and topics of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicAssignmentIndex {
    documents: DocumentTable,
    vocabulary: Vocabulary,
    topics: TopicSet,
    assignments: Vec<TopicAssignment>,
    members: Vec<Vec<usize>>,
}

/// Best topic by centroid similarity; ties go to the lower topic id.
fn nearest_topic(vector: &[f32], topics: &TopicSet) -> Option<(TopicId, f32)> {
    topics
        .topics()
        .iter()
        .map(|t| (t.id, cosine_similarity(vector, &t.centroid)))
        .fold(None, |best, (id, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((id, score)),
        })
}

/// Highest scores first, ties by lower position.
fn best_first(mut items: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    items.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    items.truncate(k);
    items
}

impl TopicAssignmentIndex {
    /// Assign every document to a topic.
    ///
    /// Clustered documents follow their cluster's topic; noise documents go
    /// to the most similar topic centroid and are flagged as outliers.
    pub fn assign(
        documents: DocumentTable,
        vocabulary: Vocabulary,
        topics: TopicSet,
        clusters: &ClusterAssignment,
    ) -> TopicResult<Self> {
        if clusters.len() != documents.len() {
            return Err(TopicError::misaligned(
                "cluster labels",
                documents.len(),
                clusters.len(),
            ));
        }
        if topics.is_empty() {
            return Err(TopicError::NoTopicsFound {
                documents: documents.len(),
            });
        }

        let assignments: Vec<TopicAssignment> = (0..documents.len())
            .into_par_iter()
            .map(|i| -> TopicResult<TopicAssignment> {
                let document = documents.document(i);
                let (topic, outlier) = match topics.topic_for_label(clusters.labels()[i]) {
                    Some(topic) => (topic, false),
                    None => {
                        let (topic, _) = nearest_topic(document.embedding, &topics)
                            .ok_or(TopicError::NoTopicsFound {
                                documents: clusters.len(),
                            })?;
                        (topic, true)
                    }
                };
                let centroid = &topics.topic(topic)?.centroid;
                Ok(TopicAssignment {
                    doc_id: document.id.clone(),
                    topic,
                    score: cosine_similarity(document.embedding, centroid),
                    outlier,
                })
            })
            .collect::<TopicResult<_>>()?;

        let index = Self::from_parts(documents, vocabulary, topics, assignments)?;
        info!(
            documents = index.assignments.len(),
            topics = index.topics.len(),
            outliers = index.assignments.iter().filter(|a| a.outlier).count(),
            "assigned documents to topics"
        );
        Ok(index)
    }

    /// Rebuild an index from stored assignments.
    pub fn from_parts(
        documents: DocumentTable,
        vocabulary: Vocabulary,
        topics: TopicSet,
        assignments: Vec<TopicAssignment>,
    ) -> TopicResult<Self> {
        if assignments.len() != documents.len() {
            return Err(TopicError::misaligned(
                "assignments",
                documents.len(),
                assignments.len(),
            ));
        }
        if vocabulary.dim() != documents.vectors().dim() {
            return Err(VectorError::DimensionMismatch {
                expected: documents.vectors().dim(),
                actual: vocabulary.dim(),
            }
            .into());
        }

        let mut members = vec![Vec::new(); topics.len()];
        for (position, (assignment, id)) in assignments.iter().zip(documents.ids()).enumerate() {
            if &assignment.doc_id != id {
                return Err(TopicError::MalformedInput {
                    origin: "assignments".to_string(),
                    reason: format!(
                        "row {position} is for document '{}' but the table has '{id}'",
                        assignment.doc_id
                    ),
                });
            }
            members
                .get_mut(assignment.topic.value())
                .ok_or(TopicError::TopicNotFound {
                    topic: assignment.topic.value(),
                    available: topics.len(),
                })?
                .push(position);
        }

        Ok(Self {
            documents,
            vocabulary,
            topics,
            assignments,
            members,
        })
    }

    pub fn documents(&self) -> &DocumentTable {
        &self.documents
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn topic_set(&self) -> &TopicSet {
        &self.topics
    }

    pub fn topics(&self) -> &[Topic] {
        self.topics.topics()
    }

    pub fn topic(&self, id: TopicId) -> TopicResult<&Topic> {
        self.topics.topic(id)
    }

    pub fn assignments(&self) -> &[TopicAssignment] {
        &self.assignments
    }

    pub fn assignment(&self, doc_id: &DocumentId) -> TopicResult<&TopicAssignment> {
        self.documents
            .position(doc_id)
            .map(|position| &self.assignments[position])
            .ok_or_else(|| TopicError::DocumentNotFound {
                id: doc_id.to_string(),
            })
    }

    /// Documents assigned to the topic, outliers included.
    pub fn topic_size(&self, id: TopicId) -> usize {
        self.members.get(id.value()).map_or(0, Vec::len)
    }

    pub fn topic_sizes(&self) -> Vec<usize> {
        self.members.iter().map(Vec::len).collect()
    }

    fn hit(&self, position: usize, score: f32) -> DocumentHit {
        DocumentHit {
            position,
            doc_id: self.documents.ids()[position].clone(),
            topic: self.assignments[position].topic,
            score,
            published: self.documents.dates()[position],
        }
    }

    /// Topics ranked by similarity to the mean of the keyword vectors.
    pub fn search_by_keywords<S: AsRef<str>>(
        &self,
        keywords: &[S],
        top_k: usize,
    ) -> TopicResult<Vec<TopicHit>> {
        let query = self.vocabulary.query_vector(keywords)?;
        let scored = self
            .topics()
            .iter()
            .map(|t| (t.id.value(), cosine_similarity(&query, &t.centroid)))
            .collect();
        Ok(best_first(scored, top_k)
            .into_iter()
            .map(|(topic, score)| TopicHit {
                topic: TopicId(topic),
                score,
                size: self.topic_size(TopicId(topic)),
            })
            .collect())
    }

    /// Members of a topic ranked by their assignment score.
    pub fn search_documents_by_topic(
        &self,
        topic: TopicId,
        top_k: usize,
    ) -> TopicResult<Vec<DocumentHit>> {
        self.topic(topic)?;
        let scored = self.members[topic.value()]
            .iter()
            .map(|&i| (i, self.assignments[i].score))
            .collect();
        Ok(best_first(scored, top_k)
            .into_iter()
            .map(|(i, score)| self.hit(i, score))
            .collect())
    }

    /// All documents ranked by similarity to the keyword query, ignoring topics.
    pub fn search_documents_by_keywords<S: AsRef<str>>(
        &self,
        keywords: &[S],
        top_k: usize,
    ) -> TopicResult<Vec<DocumentHit>> {
        let query = self.vocabulary.query_vector(keywords)?;
        let vectors = self.documents.vectors();
        let scored: Vec<(usize, f32)> = (0..vectors.rows())
            .into_par_iter()
            .map(|i| (i, cosine_similarity(vectors.row(i), &query)))
            .collect();
        Ok(best_first(scored, top_k)
            .into_iter()
            .map(|(i, score)| self.hit(i, score))
            .collect())
    }

    /// Vocabulary closest to `mean(positive) - mean(negative)`.
    ///
    /// The query terms themselves are left out. Unknown negative terms are
    /// ignored; all positive terms unknown is an `UnknownTerm` error.
    pub fn similar_words<S: AsRef<str>>(
        &self,
        positive: &[S],
        negative: &[S],
        top_k: usize,
    ) -> TopicResult<Vec<Keyword>> {
        let mut query = self.vocabulary.query_vector(positive)?;
        if !negative.is_empty() {
            match self.vocabulary.query_vector(negative) {
                Ok(against) => {
                    for (q, n) in query.iter_mut().zip(against) {
                        *q -= n;
                    }
                }
                Err(TopicError::UnknownTerm { terms }) => {
                    debug!(?terms, "ignoring unknown negative terms");
                }
                Err(other) => return Err(other),
            }
        }

        let (mut skip, _) = self.vocabulary.resolve_terms(positive);
        skip.extend(self.vocabulary.resolve_terms(negative).0);
        Ok(rank_keywords(&query, &self.vocabulary, top_k, &skip))
    }

    /// Publication dates of a topic's documents bucketed by `granularity`.
    pub fn temporal_distribution(
        &self,
        topic: TopicId,
        granularity: Granularity,
        options: TemporalOptions,
    ) -> TopicResult<TemporalDistribution> {
        self.topic(topic)?;
        let dates = self.documents.dates();
        Ok(TemporalDistribution::from_dates(
            self.members[topic.value()].iter().map(|&i| dates[i].date()),
            granularity,
            options,
        ))
    }

    /// Distributions of the `top_n` largest topics, largest first.
    pub fn temporal_overview(
        &self,
        granularity: Granularity,
        top_n: usize,
        options: TemporalOptions,
    ) -> TopicResult<Vec<(TopicId, TemporalDistribution)>> {
        let mut by_size: Vec<(TopicId, usize)> = self
            .topics()
            .iter()
            .map(|t| (t.id, self.topic_size(t.id)))
            .collect();
        by_size.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        by_size
            .into_iter()
            .take(top_n)
            .map(|(id, _)| Ok((id, self.temporal_distribution(id, granularity, options)?)))
            .collect()
    }
}
