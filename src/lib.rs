//! Topic discovery over economic news embeddings.
//!
//! The pipeline loads an embedding archive ([`store`]), projects document
//! vectors into a low-dimensional space ([`reduce`]), finds dense groups
//! ([`cluster`]), turns them into keyword topics ([`topics`]) and persists
//! the result as a named model ([`model`]) that can be explored or exported
//! ([`export`]).

pub mod cluster;
pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod io;
pub mod model;
pub mod reduce;
pub mod store;
pub mod topics;
pub mod types;
pub mod vector;

#[cfg(test)]
mod test_support;

// Explicit exports for better API clarity
pub use cluster::{ClusterAssignment, ClusterSelection, ClustererConfig, DensityClusterer};
pub use config::Settings;
pub use error::{Stage, TopicError, TopicResult};
pub use export::{ExportConfig, ExportReport, ResultExporter};
pub use model::{ExplorationSession, ModelArtifact, ModelMetadata, ModelStore, Trainer, TrainingConfig};
pub use reduce::{DimensionalityReducer, ReducerConfig};
pub use store::{DateRange, DocumentTable, EmbeddingStore, Vocabulary};
pub use topics::{
    DocumentHit, Granularity, Topic, TopicAssignment, TopicAssignmentIndex, TopicHit, TopicSet,
    TopicSynthesizer,
};
pub use types::{ClusterLabel, DocumentId, TopicId};
