//! Directory of trained models and the sessions that explore them.
//!
//! Each model lives in `<root>/<name>/`. Saving goes through a
//! [`Reservation`]: an exclusive `.<name>.lock` file is created first, the
//! bundle is written into a hidden temporary directory, and the directory is
//! renamed into place only once complete.

use crate::error::{IoContext, TopicError, TopicResult};
use crate::model::artifact::{ModelArtifact, ModelMetadata};
use crate::topics::{
    DocumentHit, Granularity, Keyword, TemporalDistribution, TemporalOptions, Topic,
    TopicAssignmentIndex, TopicHit,
};
use crate::types::TopicId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A model found in the store.
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub path: PathBuf,
    pub metadata: ModelMetadata,
}

/// Models directory with a cache of loaded artifacts.
#[derive(Debug)]
pub struct ModelStore {
    root: PathBuf,
    cache: RwLock<HashMap<(String, String), Arc<ModelArtifact>>>,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn validate_name(name: &str) -> TopicResult<()> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(())
        } else {
            Err(TopicError::invalid_parameter(
                "model name",
                name,
                "use letters, digits, '-', '_' or '.', not starting with '.'",
            ))
        }
    }

    /// Claim `name` for a new model.
    ///
    /// Fails with `NameConflict` when the model already exists or another
    /// run holds the lock.
    pub fn reserve(&self, name: &str) -> TopicResult<Reservation> {
        Self::validate_name(name)?;
        fs::create_dir_all(&self.root).write_context(&self.root)?;

        let final_path = self.model_path(name);
        if final_path.exists() {
            return Err(TopicError::NameConflict {
                name: name.to_string(),
                path: final_path,
            });
        }

        let lock_path = self.root.join(format!(".{name}.lock"));
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(TopicError::NameConflict {
                    name: name.to_string(),
                    path: lock_path,
                });
            }
            Err(e) => return Err(e).write_context(&lock_path),
        }
        debug!(model = name, lock = %lock_path.display(), "reserved model name");

        Ok(Reservation {
            name: name.to_string(),
            root: self.root.clone(),
            lock_path,
            final_path,
        })
    }

    /// Reserve and commit in one step.
    pub fn save(&self, artifact: &mut ModelArtifact) -> TopicResult<PathBuf> {
        let name = artifact.name().to_string();
        self.reserve(&name)?.commit(artifact)
    }

    /// Saved models, newest first. Hidden entries (locks, unfinished
    /// bundles) are skipped.
    pub fn list(&self) -> TopicResult<Vec<ModelSummary>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut models = Vec::new();
        for entry in fs::read_dir(&self.root).read_context(&self.root)? {
            let entry = entry.read_context(&self.root)?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden || !path.is_dir() || !ModelMetadata::exists(&path) {
                continue;
            }
            match ModelMetadata::load(&path) {
                Ok(metadata) => models.push(ModelSummary { path, metadata }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable model"),
            }
        }

        models.sort_by(|a, b| {
            b.metadata
                .timestamp
                .cmp(&a.metadata.timestamp)
                .then_with(|| a.metadata.name.cmp(&b.metadata.name))
        });
        Ok(models)
    }

    /// Load a model, sharing one instance per name and digest.
    pub fn load(&self, name: &str) -> TopicResult<Arc<ModelArtifact>> {
        Self::validate_name(name)?;
        let path = self.model_path(name);
        if !ModelMetadata::exists(&path) {
            return Err(TopicError::ModelNotFound {
                name: name.to_string(),
                path,
            });
        }

        let digest = ModelMetadata::load(&path)?.digest;
        let key = (name.to_string(), digest);
        if let Some(artifact) = self.cache.read().get(&key) {
            debug!(model = name, "model served from cache");
            return Ok(artifact.clone());
        }

        let artifact = Arc::new(ModelArtifact::load(&path)?);
        self.cache.write().insert(key, artifact.clone());
        Ok(artifact)
    }

    /// Open an exploration session over a saved model.
    pub fn session(&self, name: &str) -> TopicResult<ExplorationSession> {
        Ok(ExplorationSession::new(self.load(name)?))
    }
}

/// Exclusive claim on a model name, released on drop.
#[derive(Debug)]
pub struct Reservation {
    name: String,
    root: PathBuf,
    lock_path: PathBuf,
    final_path: PathBuf,
}

impl Reservation {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write the bundle and move it into place.
    pub fn commit(self, artifact: &mut ModelArtifact) -> TopicResult<PathBuf> {
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}.tmp", self.name))
            .tempdir_in(&self.root)
            .write_context(&self.root)?;
        artifact.write_to(staging.path())?;

        if self.final_path.exists() {
            return Err(TopicError::NameConflict {
                name: self.name.clone(),
                path: self.final_path.clone(),
            });
        }

        let staged = staging.keep();
        if let Err(e) = fs::rename(&staged, &self.final_path) {
            let _ = fs::remove_dir_all(&staged);
            return Err(e).write_context(&self.final_path);
        }
        Ok(self.final_path.clone())
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            warn!(lock = %self.lock_path.display(), error = %e, "failed to release model lock");
        }
    }
}

/// Read-only exploration of one model.
#[derive(Debug, Clone)]
pub struct ExplorationSession {
    artifact: Arc<ModelArtifact>,
}

impl ExplorationSession {
    pub fn new(artifact: Arc<ModelArtifact>) -> Self {
        Self { artifact }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn metadata(&self) -> &ModelMetadata {
        self.artifact.metadata()
    }

    pub fn index(&self) -> &TopicAssignmentIndex {
        self.artifact.index()
    }

    pub fn topics(&self) -> &[Topic] {
        self.index().topics()
    }

    pub fn topic(&self, id: TopicId) -> TopicResult<&Topic> {
        self.index().topic(id)
    }

    pub fn search_topics<S: AsRef<str>>(
        &self,
        keywords: &[S],
        top_k: usize,
    ) -> TopicResult<Vec<TopicHit>> {
        self.index().search_by_keywords(keywords, top_k)
    }

    pub fn search_documents<S: AsRef<str>>(
        &self,
        keywords: &[S],
        top_k: usize,
    ) -> TopicResult<Vec<DocumentHit>> {
        self.index().search_documents_by_keywords(keywords, top_k)
    }

    pub fn topic_documents(&self, topic: TopicId, top_k: usize) -> TopicResult<Vec<DocumentHit>> {
        self.index().search_documents_by_topic(topic, top_k)
    }

    pub fn similar_words<S: AsRef<str>>(
        &self,
        positive: &[S],
        negative: &[S],
        top_k: usize,
    ) -> TopicResult<Vec<Keyword>> {
        self.index().similar_words(positive, negative, top_k)
    }

    pub fn temporal(
        &self,
        topic: TopicId,
        granularity: Granularity,
        options: TemporalOptions,
    ) -> TopicResult<TemporalDistribution> {
        self.index().temporal_distribution(topic, granularity, options)
    }

    /// Text of a document hit, if the model stores texts.
    pub fn text(&self, hit: &DocumentHit) -> Option<&str> {
        self.index()
            .documents()
            .texts()
            .and_then(|texts| texts.get(hit.position))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifact::tests::sample_artifact;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_through_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());

        let mut artifact = sample_artifact("macro");
        let path = store.save(&mut artifact).unwrap();
        assert_eq!(path, temp_dir.path().join("macro"));
        assert!(!temp_dir.path().join(".macro.lock").exists());

        let first = store.load("macro").unwrap();
        let second = store.load("macro").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, artifact);
    }

    #[test]
    fn test_second_save_with_same_name_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());

        store.save(&mut sample_artifact("dup")).unwrap();
        let err = store.save(&mut sample_artifact("dup")).unwrap_err();
        assert!(matches!(err, TopicError::NameConflict { .. }));
    }

    #[test]
    fn test_held_reservation_blocks_name() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());

        let reservation = store.reserve("busy").unwrap();
        assert_eq!(reservation.name(), "busy");
        let err = store.reserve("busy").unwrap_err();
        assert_eq!(err.status_code(), "NAME_CONFLICT");

        drop(reservation);
        assert!(store.reserve("busy").is_ok());
    }

    #[test]
    fn test_list_is_newest_first_and_skips_hidden() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());

        let mut older = sample_artifact("older");
        store.save(&mut older).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let mut newer = sample_artifact("newer");
        store.save(&mut newer).unwrap();
        fs::create_dir(temp_dir.path().join(".half.tmp123")).unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|m| m.metadata.name)
            .collect();
        assert_eq!(names, vec!["newer".to_string(), "older".to_string()]);
    }

    #[test]
    fn test_missing_model_and_bad_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());

        let err = store.load("ghost").unwrap_err();
        assert_eq!(err.status_code(), "MODEL_NOT_FOUND");
        assert!(store.reserve("../escape").is_err());
        assert!(store.reserve(".hidden").is_err());
    }

    #[test]
    fn test_session_queries() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path());
        store.save(&mut sample_artifact("session")).unwrap();

        let session = store.session("session").unwrap();
        assert_eq!(session.topics().len(), 2);

        let hits = session.search_topics(&["inflación"], 1).unwrap();
        let topic = hits[0].topic;
        assert!(session.topic(topic).unwrap().top_words(1).contains(&"inflación"));

        let docs = session.topic_documents(topic, 10).unwrap();
        assert!(docs.iter().any(|d| d.doc_id.as_str() == "n1"));
        let first = docs.iter().find(|d| d.doc_id.as_str() == "n1").unwrap();
        assert_eq!(session.text(first), Some("la inflación sube"));

        let err = session.search_documents(&["desconocido"], 3).unwrap_err();
        assert_eq!(err.status_code(), "UNKNOWN_TERM");
    }
}
