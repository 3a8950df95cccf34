//! Error types for the topic-discovery pipeline.
//!
//! Every failure carries an actionable suggestion and, once it crosses a
//! pipeline boundary, the [`Stage`] it happened in.

use crate::vector::{VectorError, VectorStorageError};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Reduce,
    Cluster,
    Synthesize,
    Assign,
    Persist,
    Export,
    Query,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Reduce => "reduce",
            Stage::Cluster => "cluster",
            Stage::Synthesize => "synthesize",
            Stage::Assign => "assign",
            Stage::Persist => "persist",
            Stage::Export => "export",
            Stage::Query => "query",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for training, persistence and exploration.
#[derive(Error, Debug)]
pub enum TopicError {
    #[error(
        "Archive '{archive}' has none of the keys {expected:?} (present: {present:?})\nSuggestion: Re-export the archive with one of the expected array names"
    )]
    MissingKey {
        archive: PathBuf,
        expected: Vec<String>,
        present: Vec<String>,
    },

    #[error(
        "Per-document array '{field}' has {actual} rows but {expected} documents were loaded\nSuggestion: Make sure ids, dates, texts and vectors come from the same corpus snapshot"
    )]
    MisalignedArrays {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid value {value} for '{parameter}': {reason}\nSuggestion: Adjust the setting in .econtopics/settings.toml or on the command line")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error("Cluster {cluster} has no member documents\nSuggestion: This indicates inconsistent cluster labels, retrain the model")]
    EmptyCluster { cluster: usize },

    #[error("None of the terms {terms:?} are in the model vocabulary\nSuggestion: Try other keywords or use 'similar-words' to explore the vocabulary")]
    UnknownTerm { terms: Vec<String> },

    #[error("A model named '{name}' already exists or is being trained at '{path}'\nSuggestion: Choose another name or remove the existing model first")]
    NameConflict { name: String, path: PathBuf },

    #[error("Clustering found no topics among {documents} documents\nSuggestion: Lower clusterer.min_cluster_size or clusterer.min_samples")]
    NoTopicsFound { documents: usize },

    #[error("Topic {topic} does not exist (model has {available} topics)\nSuggestion: Run 'econtopics topics <model>' to list topic ids")]
    TopicNotFound { topic: usize, available: usize },

    #[error("Document '{id}' not found in the model")]
    DocumentNotFound { id: String },

    #[error("Duplicate {kind} '{key}'\nSuggestion: {kind} values must be unique")]
    DuplicateKey { kind: &'static str, key: String },

    #[error("Malformed input in {origin}: {reason}")]
    MalformedInput { origin: String, reason: String },

    #[error("Model '{name}' not found at '{path}'\nSuggestion: Run 'econtopics models' to list trained models")]
    ModelNotFound { name: String, path: PathBuf },

    #[error("Model artifact at '{path}' is corrupted: {reason}\nSuggestion: Retrain the model under a new name")]
    ArtifactCorrupted { path: PathBuf, reason: String },

    #[error("Export to '{path}' failed: {reason}\nSuggestion: The trained model is intact, fix the output location and run 'econtopics export'")]
    ExportFailed { path: PathBuf, reason: String },

    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("CSV error in '{path}': {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Storage(#[from] VectorStorageError),

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        source: Box<TopicError>,
    },
}

impl TopicError {
    pub fn invalid_parameter(
        parameter: impl Into<String>,
        value: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn misaligned(field: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::MisalignedArrays {
            field: field.into(),
            expected,
            actual,
        }
    }

    /// Stage recorded on this error, if it was wrapped by the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error, skipping stage wrappers.
    pub fn root(&self) -> &TopicError {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Used in JSON responses for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self.root() {
            Self::MissingKey { .. } => "MISSING_KEY",
            Self::MisalignedArrays { .. } => "MISALIGNED_ARRAYS",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::EmptyCluster { .. } => "EMPTY_CLUSTER",
            Self::UnknownTerm { .. } => "UNKNOWN_TERM",
            Self::NameConflict { .. } => "NAME_CONFLICT",
            Self::NoTopicsFound { .. } => "NO_TOPICS_FOUND",
            Self::TopicNotFound { .. } => "TOPIC_NOT_FOUND",
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            Self::DuplicateKey { .. } => "DUPLICATE_KEY",
            Self::MalformedInput { .. } => "MALFORMED_INPUT",
            Self::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            Self::ArtifactCorrupted { .. } => "ARTIFACT_CORRUPTED",
            Self::ExportFailed { .. } => "EXPORT_FAILED",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::Json { .. } => "JSON_ERROR",
            Self::Csv { .. } => "CSV_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::StageFailed { .. } => "STAGE_FAILED",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self.root() {
            Self::MissingKey { .. } => vec![
                "Document vectors must be stored as 'document_vectors' or 'embeddings'",
                "Pass --corpus to take ids, dates and texts from the source CSV",
            ],
            Self::MisalignedArrays { .. } => vec![
                "Regenerate the embeddings from the same CSV used for training",
                "Check that the CSV has no blank or duplicated rows",
            ],
            Self::InvalidParameter { .. } | Self::Config { .. } => vec![
                "Run 'econtopics config' to inspect the active settings",
                "Run 'econtopics init --force' to regenerate a default configuration",
            ],
            Self::UnknownTerm { .. } => vec![
                "Keywords are matched against the lowercase vocabulary",
                "Use 'econtopics similar-words' with a known term to explore the vocabulary",
            ],
            Self::NameConflict { .. } => vec![
                "Pick a new model name",
                "If no training is running, delete the stale '.<name>.lock' file",
            ],
            Self::NoTopicsFound { .. } => vec![
                "Lower clusterer.min_cluster_size",
                "Widen the date range to include more documents",
            ],
            Self::ArtifactCorrupted { .. } => vec![
                "Retrain the model, the stored files no longer match their digest",
            ],
            Self::ExportFailed { .. } => vec![
                "Check disk space and permissions in the results directory",
                "Re-run 'econtopics export <model>', the model does not need retraining",
            ],
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
            ],
            Self::FileWrite { .. } => vec![
                "Check disk space and permissions of the output directory",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for pipeline operations
pub type TopicResult<T> = Result<T, TopicError>;

/// Attach the pipeline stage to an error.
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage) -> TopicResult<T>;
}

impl<T> StageContext<T> for TopicResult<T> {
    fn in_stage(self, stage: Stage) -> TopicResult<T> {
        self.map_err(|e| match e {
            already @ TopicError::StageFailed { .. } => already,
            other => TopicError::StageFailed {
                stage,
                source: Box::new(other),
            },
        })
    }
}

/// Helper trait for adding a path to I/O errors
pub trait IoContext<T> {
    fn read_context(self, path: &Path) -> TopicResult<T>;
    fn write_context(self, path: &Path) -> TopicResult<T>;
}

impl<T> IoContext<T> for Result<T, std::io::Error> {
    fn read_context(self, path: &Path) -> TopicResult<T> {
        self.map_err(|source| TopicError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_context(self, path: &Path) -> TopicResult<T> {
        self.map_err(|source| TopicError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_is_not_nested() {
        let err: TopicResult<()> = Err(TopicError::NoTopicsFound { documents: 10 });
        let err = err.in_stage(Stage::Synthesize).in_stage(Stage::Persist);

        let err = err.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Synthesize));
        assert_eq!(err.status_code(), "NO_TOPICS_FOUND");
        assert!(err.to_string().starts_with("synthesize stage failed"));
    }

    #[test]
    fn test_invalid_parameter_names_parameter() {
        let err = TopicError::invalid_parameter("reducer.n_neighbors", 1, "must be at least 2");
        let message = err.to_string();
        assert!(message.contains("reducer.n_neighbors"));
        assert!(message.contains("Suggestion:"));
        assert!(!err.recovery_suggestions().is_empty());
    }
}
