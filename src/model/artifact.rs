//! A trained model and its on-disk bundle.
//!
//! The bundle is an archive directory (see [`crate::store::archive`]) with
//! the clustering, topics and assignments added next to the input arrays,
//! plus a `metadata.json` carrying a digest of every other file.

use crate::cluster::ClusterAssignment;
use crate::error::{IoContext, TopicError, TopicResult};
use crate::model::train::TrainingConfig;
use crate::store::{Archive, ArchiveWriter, EmbeddingStore, write_archive};
use crate::topics::{TopicAssignment, TopicAssignmentIndex, TopicSet};
use crate::types::ClusterLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const METADATA_FILE: &str = "metadata.json";
const CLUSTERS_KEY: &str = "clusters";
const TOPICS_KEY: &str = "topics";
const ASSIGNMENTS_KEY: &str = "assignments";

/// Descriptive data stored in `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Version of the bundle format
    pub version: u32,

    pub name: String,

    /// When training finished
    pub timestamp: DateTime<Utc>,

    pub num_topics: usize,

    pub num_documents: usize,

    /// Documents the clusterer left as noise
    #[serde(default)]
    pub num_outliers: usize,

    pub execution_time_seconds: f64,

    pub config: TrainingConfig,

    /// Hex sha256 over the other bundle files, empty until the bundle is written
    #[serde(default)]
    pub digest: String,
}

impl ModelMetadata {
    /// Current bundle format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Save metadata into the bundle directory
    pub fn save(&self, path: &Path) -> TopicResult<()> {
        let metadata_path = path.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|source| TopicError::Json {
            path: metadata_path.clone(),
            source,
        })?;
        fs::write(&metadata_path, json).write_context(&metadata_path)
    }

    /// Load metadata from the bundle directory
    pub fn load(path: &Path) -> TopicResult<Self> {
        let metadata_path = path.join(METADATA_FILE);
        let json = fs::read_to_string(&metadata_path).read_context(&metadata_path)?;
        let metadata: Self = serde_json::from_str(&json).map_err(|e| {
            TopicError::ArtifactCorrupted {
                path: path.to_path_buf(),
                reason: format!("unreadable metadata: {e}"),
            }
        })?;

        if metadata.version > Self::CURRENT_VERSION {
            return Err(TopicError::ArtifactCorrupted {
                path: path.to_path_buf(),
                reason: format!(
                    "bundle version {} is newer than supported version {}",
                    metadata.version,
                    Self::CURRENT_VERSION
                ),
            });
        }

        Ok(metadata)
    }

    /// Check if a metadata file exists
    pub fn exists(path: &Path) -> bool {
        path.join(METADATA_FILE).exists()
    }
}

/// Hex sha256 over every file of the bundle except the metadata, by file name.
pub fn bundle_digest(path: &Path) -> TopicResult<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path).read_context(path)? {
        let entry = entry.read_context(path)?;
        if !entry.file_type().read_context(path)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name != METADATA_FILE {
            names.push(name);
        }
    }
    names.sort();

    let mut hasher = Sha256::new();
    for name in &names {
        let file_path = path.join(name);
        let bytes = fs::read(&file_path).read_context(&file_path)?;
        hasher.update(name.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Everything a trained model consists of.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    metadata: ModelMetadata,
    index: TopicAssignmentIndex,
    clusters: ClusterAssignment,
}

impl ModelArtifact {
    pub fn new(
        name: impl Into<String>,
        index: TopicAssignmentIndex,
        clusters: ClusterAssignment,
        config: TrainingConfig,
        execution_time: Duration,
    ) -> Self {
        let metadata = ModelMetadata {
            version: ModelMetadata::CURRENT_VERSION,
            name: name.into(),
            timestamp: Utc::now(),
            num_topics: index.topics().len(),
            num_documents: index.assignments().len(),
            num_outliers: clusters.noise_count(),
            execution_time_seconds: execution_time.as_secs_f64(),
            config,
            digest: String::new(),
        };
        Self {
            metadata,
            index,
            clusters,
        }
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn index(&self) -> &TopicAssignmentIndex {
        &self.index
    }

    pub fn clusters(&self) -> &ClusterAssignment {
        &self.clusters
    }

    pub fn topics(&self) -> &TopicSet {
        self.index.topic_set()
    }

    /// Write the bundle into `path` and record its digest in the metadata.
    pub fn write_to(&mut self, path: &Path) -> TopicResult<()> {
        let writer = ArchiveWriter::create(path)?;
        write_archive(
            &writer,
            self.index.documents(),
            Some(self.index.vocabulary()),
        )?;
        writer.write_json(CLUSTERS_KEY, self.clusters.labels())?;
        writer.write_json(TOPICS_KEY, self.index.topic_set())?;
        writer.write_json(ASSIGNMENTS_KEY, self.index.assignments())?;

        self.metadata.digest = bundle_digest(path)?;
        self.metadata.save(path)?;
        debug!(
            path = %path.display(),
            digest = %self.metadata.digest,
            "wrote model bundle"
        );
        Ok(())
    }

    /// Read a bundle, verifying its digest first.
    pub fn load(path: &Path) -> TopicResult<Self> {
        let metadata = ModelMetadata::load(path)?;
        let digest = bundle_digest(path)?;
        if digest != metadata.digest {
            return Err(TopicError::ArtifactCorrupted {
                path: path.to_path_buf(),
                reason: format!(
                    "digest mismatch (expected {}, found {digest})",
                    metadata.digest
                ),
            });
        }

        let store = EmbeddingStore::load(path)?;
        let (documents, vocabulary) = store.into_parts();
        let vocabulary = vocabulary.ok_or_else(|| TopicError::ArtifactCorrupted {
            path: path.to_path_buf(),
            reason: "bundle has no vocabulary".to_string(),
        })?;

        let archive = Archive::open(path)?;
        let labels: Vec<ClusterLabel> =
            archive.read_json(archive.require(&[CLUSTERS_KEY])?.1)?;
        let topics: TopicSet = archive.read_json(archive.require(&[TOPICS_KEY])?.1)?;
        let assignments: Vec<TopicAssignment> =
            archive.read_json(archive.require(&[ASSIGNMENTS_KEY])?.1)?;

        let clusters = ClusterAssignment::from_labels(labels)?;
        if clusters.len() != documents.len() {
            return Err(TopicError::misaligned(
                "cluster labels",
                documents.len(),
                clusters.len(),
            ));
        }
        let index = TopicAssignmentIndex::from_parts(documents, vocabulary, topics, assignments)?;

        info!(
            model = %metadata.name,
            topics = metadata.num_topics,
            documents = metadata.num_documents,
            "loaded model bundle"
        );
        Ok(Self {
            metadata,
            index,
            clusters,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{DocumentTable, Vocabulary};
    use crate::test_support::date;
    use crate::topics::{MergeConfig, TopicSynthesizer};
    use crate::types::DocumentId;
    use crate::vector::Matrix;
    use tempfile::TempDir;

    /// Small trained-looking artifact built without running the reducer.
    pub(crate) fn sample_artifact(name: &str) -> ModelArtifact {
        let vectors = Matrix::from_rows(vec![
            vec![1.0, 0.1, 0.0],
            vec![0.9, 0.0, 0.1],
            vec![0.1, 1.0, 0.0],
            vec![0.0, 0.9, 0.1],
            vec![0.5, 0.5, 0.0],
        ])
        .unwrap();
        let ids = ["n1", "n2", "n3", "n4", "n5"]
            .iter()
            .map(|s| DocumentId::from(*s))
            .collect();
        let dates = vec![
            date(2022, 1, 10),
            date(2022, 2, 3),
            date(2022, 2, 20),
            date(2022, 5, 1),
            date(2023, 1, 1),
        ];
        let texts = Some(
            [
                "la inflación sube",
                "los precios no ceden",
                "el empleo crece",
                "salarios y empleo",
                "economía mixta",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        );
        let documents = DocumentTable::new(ids, dates, texts, vectors.clone()).unwrap();
        let vocabulary = Vocabulary::new(
            vec![
                "inflación".to_string(),
                "precios".to_string(),
                "empleo".to_string(),
                "salarios".to_string(),
            ],
            Matrix::from_rows(vec![
                vec![1.0, 0.0, 0.0],
                vec![0.8, 0.1, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.1, 0.8, 0.0],
            ])
            .unwrap(),
        )
        .unwrap();
        let clusters = ClusterAssignment::from_labels(vec![
            ClusterLabel::cluster(0),
            ClusterLabel::cluster(0),
            ClusterLabel::cluster(1),
            ClusterLabel::cluster(1),
            ClusterLabel::NOISE,
        ])
        .unwrap();
        let topics = TopicSynthesizer::new(MergeConfig::default(), 3)
            .unwrap()
            .synthesize(&clusters, &vectors, &vocabulary)
            .unwrap();
        let index = TopicAssignmentIndex::assign(documents, vocabulary, topics, &clusters).unwrap();
        ModelArtifact::new(
            name,
            index,
            clusters,
            TrainingConfig::default(),
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn test_artifact_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut artifact = sample_artifact("economia-2022");
        artifact.write_to(temp_dir.path()).unwrap();
        assert_eq!(artifact.metadata().digest.len(), 64);

        let loaded = ModelArtifact::load(temp_dir.path()).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.metadata().num_topics, 2);
        assert_eq!(loaded.metadata().num_outliers, 1);
        assert!(loaded.index().assignments()[4].outlier);
    }

    #[test]
    fn test_bundle_is_an_input_archive() {
        let temp_dir = TempDir::new().unwrap();
        let mut artifact = sample_artifact("reuse");
        artifact.write_to(temp_dir.path()).unwrap();

        let store = EmbeddingStore::load(temp_dir.path()).unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.vocabulary().unwrap().len(), 4);
        assert_eq!(store.documents().texts().unwrap()[0], "la inflación sube");
    }

    #[test]
    fn test_tampered_bundle_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut artifact = sample_artifact("tampered");
        artifact.write_to(temp_dir.path()).unwrap();

        fs::write(temp_dir.path().join("doc_ids.json"), r#"["a","b","c","d","e"]"#).unwrap();

        let err = ModelArtifact::load(temp_dir.path()).unwrap_err();
        assert!(matches!(err, TopicError::ArtifactCorrupted { .. }));
    }

    #[test]
    fn test_newer_metadata_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut artifact = sample_artifact("future");
        artifact.write_to(temp_dir.path()).unwrap();

        let mut metadata = ModelMetadata::load(temp_dir.path()).unwrap();
        metadata.version = ModelMetadata::CURRENT_VERSION + 1;
        metadata.save(temp_dir.path()).unwrap();

        let err = ModelMetadata::load(temp_dir.path()).unwrap_err();
        assert_eq!(err.status_code(), "ARTIFACT_CORRUPTED");
        assert!(ModelMetadata::exists(temp_dir.path()));
    }
}
