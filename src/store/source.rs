//! Batch providers of document embeddings.

use crate::error::{TopicError, TopicResult};
use crate::store::vocab::Vocabulary;
use crate::vector::{EmbeddingGenerator, Matrix};
use std::sync::Arc;

/// Sequential provider of document embeddings.
///
/// Batches come back in stored order. Once fewer than `n` rows remain the
/// batch holds only the remainder; an exhausted source yields empty batches.
pub trait EmbeddingSource {
    fn next_batch(&mut self, n: usize) -> TopicResult<Matrix>;

    /// Rows not yet handed out.
    fn remaining(&self) -> usize;

    fn dimension(&self) -> usize;

    /// Pull every remaining row, `batch_size` at a time.
    ///
    /// `on_batch` receives the size of each batch, for progress reporting.
    fn drain(
        &mut self,
        batch_size: usize,
        on_batch: &mut dyn FnMut(usize),
    ) -> TopicResult<Matrix> {
        let mut all = Matrix::empty(self.dimension())?;
        while self.remaining() > 0 {
            let batch = self.next_batch(batch_size.max(1))?;
            if batch.is_empty() {
                break;
            }
            on_batch(batch.rows());
            all.extend(&batch)?;
        }
        Ok(all)
    }
}

/// Encodes texts on demand with an embedding model.
pub struct EncoderSource {
    texts: Vec<String>,
    generator: Arc<dyn EmbeddingGenerator>,
    cursor: usize,
}

impl EncoderSource {
    pub fn new(texts: Vec<String>, generator: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            texts,
            generator,
            cursor: 0,
        }
    }
}

impl EmbeddingSource for EncoderSource {
    fn next_batch(&mut self, n: usize) -> TopicResult<Matrix> {
        let end = (self.cursor + n).min(self.texts.len());
        let batch: Vec<&str> = self.texts[self.cursor..end]
            .iter()
            .map(String::as_str)
            .collect();
        self.cursor = end;

        if batch.is_empty() {
            return Ok(Matrix::empty(self.dimension())?);
        }
        let embeddings = self.generator.generate_embeddings(&batch)?;
        if embeddings.len() != batch.len() {
            return Err(TopicError::misaligned(
                "encoder batch",
                batch.len(),
                embeddings.len(),
            ));
        }
        Ok(Matrix::from_rows(embeddings)?)
    }

    fn remaining(&self) -> usize {
        self.texts.len() - self.cursor
    }

    fn dimension(&self) -> usize {
        self.generator.dimension().get()
    }
}

/// Embed vocabulary tokens with the same model as the documents.
pub fn encode_vocabulary(
    tokens: Vec<String>,
    generator: Arc<dyn EmbeddingGenerator>,
    batch_size: usize,
) -> TopicResult<Vocabulary> {
    let mut source = EncoderSource::new(tokens.clone(), generator);
    let vectors = source.drain(batch_size, &mut |_| {})?;
    Vocabulary::new(tokens, vectors)
}
