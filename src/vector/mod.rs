//! Vector primitives for the topic pipeline.
//!
//! Holds the row-major [`Matrix`] every stage passes around, similarity and
//! distance helpers, the binary matrix file format used by model bundles,
//! and embedding generators for encoding text on the fly.

mod embedding;
mod similarity;
mod storage;
mod types;

#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, default_model_cache_dir, parse_embedding_model,
};
pub use similarity::{
    DistanceMetric, cosine_similarity, dot, euclidean_distance, mean_vector, normalize_vector,
    normalized,
};
pub use storage::{MatrixFile, VectorStorageError};
pub use types::{Matrix, VectorDimension, VectorError};
