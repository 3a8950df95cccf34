use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable document identifier taken from the source corpus.
///
/// Integer ids are kept in their decimal form so lookups by id work the same
/// whether the corpus stored strings or numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier used when the corpus has no id column.
    pub fn positional(index: usize) -> Self {
        Self(index.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Dense topic id. Topic 0 is the largest topic of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(pub usize);

impl TopicId {
    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clusterer output for one document: a dense cluster id or noise.
///
/// Serialized as a plain integer with `-1` for noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterLabel(i32);

impl ClusterLabel {
    pub const NOISE: ClusterLabel = ClusterLabel(-1);

    pub fn cluster(id: usize) -> Self {
        Self(i32::try_from(id).unwrap_or(i32::MAX))
    }

    /// Cluster id, or `None` for noise.
    pub fn id(&self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }

    pub fn is_noise(&self) -> bool {
        self.0 < 0
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl From<i32> for ClusterLabel {
    fn from(value: i32) -> Self {
        if value < 0 { Self::NOISE } else { Self(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_label() {
        assert!(ClusterLabel::NOISE.is_noise());
        assert_eq!(ClusterLabel::NOISE.id(), None);
        assert_eq!(ClusterLabel::cluster(3).id(), Some(3));
        assert_eq!(ClusterLabel::from(-7), ClusterLabel::NOISE);

        let json = serde_json::to_string(&vec![ClusterLabel::cluster(0), ClusterLabel::NOISE]).unwrap();
        assert_eq!(json, "[0,-1]");
    }

    #[test]
    fn test_positional_document_id() {
        assert_eq!(DocumentId::positional(12).as_str(), "12");
        assert_eq!(DocumentId::from("nota-7").to_string(), "nota-7");
    }
}
