//! Training runs and trained models.

pub mod artifact;
pub mod store;
pub mod train;

pub use artifact::{ModelArtifact, ModelMetadata, bundle_digest};
pub use store::{ExplorationSession, ModelStore, ModelSummary, Reservation};
pub use train::{Trainer, TrainingConfig};
