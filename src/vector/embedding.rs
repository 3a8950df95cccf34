//! Embedding generation for on-the-fly encoding of documents and vocabulary.
//!
//! Precomputed archives never touch this module. It backs the encoder
//! variant of [`crate::store::EmbeddingSource`] with fastembed.

use crate::vector::{VectorDimension, VectorError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

/// Trait for generating embeddings from text.
///
/// Implementations of this trait should be thread-safe and
/// capable of handling batch processing efficiently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts, one per input, in input order.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Parse a model name from configuration into a fastembed model.
///
/// Multilingual models come first since the corpus is Spanish.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        "MultilingualE5Base" => Ok(EmbeddingModel::MultilingualE5Base),
        "ParaphraseMLMiniLML12V2" => Ok(EmbeddingModel::ParaphraseMLMiniLML12V2),
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => Err(VectorError::EmbeddingFailed(format!(
            "Unknown embedding model '{other}'. Supported: MultilingualE5Small, MultilingualE5Base, ParaphraseMLMiniLML12V2, AllMiniLML6V2"
        ))),
    }
}

/// Default cache directory for downloaded models.
pub fn default_model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("econtopics")
        .join("models")
}

/// fastembed-backed generator.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    batch_size: usize,
}

impl FastEmbedGenerator {
    /// Load (downloading on first use) the named model.
    ///
    /// # Errors
    /// Returns an error if the model name is unknown or fails to initialize.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        batch_size: usize,
        show_progress: bool,
    ) -> Result<Self, VectorError> {
        let model = parse_embedding_model(model_name)?;
        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        // Get dimensions by generating a probe embedding
        let probe = text_model
            .embed(vec!["probe"], None)
            .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;
        let dim = probe.first().map(Vec::len).unwrap_or_default();

        Ok(Self {
            model: Mutex::new(text_model),
            dimension: VectorDimension::new(dim)?,
            batch_size: batch_size.max(1),
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, Some(self.batch_size))
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Mock embedding generator for testing.
///
/// Maps a few economic terms onto fixed axes so tests can build corpora with
/// known topic structure.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dim.max(4)).unwrap(),
        }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            let lower = text.to_lowercase();
            let mut embedding = vec![0.01; dim];
            if lower.contains("inflación") || lower.contains("precios") {
                embedding[0] = 1.0;
            }
            if lower.contains("empleo") || lower.contains("trabajo") {
                embedding[1] = 1.0;
            }
            if lower.contains("petróleo") || lower.contains("energía") {
                embedding[2] = 1.0;
            }
            // Small deterministic jitter so documents are not identical
            let jitter = lower.bytes().map(u32::from).sum::<u32>() % 97;
            embedding[dim - 1] += jitter as f32 / 1000.0;

            crate::vector::normalize_vector(&mut embedding);
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_embedding_generator() {
        let generator = MockEmbeddingGenerator::new(8);

        let texts = vec!["La inflación subió", "El empleo cae", "Precios del petróleo"];
        let embeddings = generator.generate_embeddings(&texts).unwrap();

        assert_eq!(embeddings.len(), 3);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), 8);
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((magnitude - 1.0).abs() < 0.01);
        }
        assert!(embeddings[0][0] > embeddings[0][1]);
        assert!(embeddings[1][1] > embeddings[1][0]);
    }

    #[test]
    fn test_parse_embedding_model() {
        assert!(parse_embedding_model("MultilingualE5Small").is_ok());
        assert!(matches!(
            parse_embedding_model("word2vec"),
            Err(VectorError::EmbeddingFailed(_))
        ));
    }
}
