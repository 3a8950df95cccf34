//! Embedding store: documents, their vectors and the vocabulary.
//!
//! Inputs come from an archive directory (see [`archive`]), optionally joined
//! with the source corpus CSV, or from an [`EmbeddingSource`] that encodes
//! texts on the fly. Everything per-document lives in one [`DocumentTable`].

pub mod archive;
pub mod corpus;
pub mod source;
pub mod table;
pub mod vocab;

pub use archive::{Archive, ArchiveWriter};
pub use corpus::{CorpusColumns, CorpusRecords, read_corpus};
pub use source::{EmbeddingSource, EncoderSource, encode_vocabulary};
pub use table::{DateRange, DocumentRef, DocumentTable, TIMESTAMP_FORMAT, parse_timestamp};
pub use vocab::{Vocabulary, build_vocabulary, tokenize};

use crate::error::{TopicError, TopicResult};
use crate::types::DocumentId;
use crate::vector::Matrix;
use chrono::NaiveDateTime;
use std::path::Path;
use tracing::{debug, info, warn};

/// Recognized names for the document vector array.
pub const DOCUMENT_VECTOR_KEYS: &[&str] = &["document_vectors", "embeddings"];
pub const WORD_VECTOR_KEYS: &[&str] = &["word_vectors"];
pub const VOCABULARY_KEYS: &[&str] = &["vocabulary", "vocab"];
pub const DOC_ID_KEYS: &[&str] = &["doc_ids", "doc_id"];
pub const PUB_DATE_KEYS: &[&str] = &["pub_dates", "pub_date"];
pub const TEXT_KEYS: &[&str] = &["documents", "texts"];

/// Arrays read from an archive before they are assembled into a table.
struct RawArchive {
    archive: Archive,
    vectors: Matrix,
    vocabulary: Option<Vocabulary>,
    ids: Option<Vec<DocumentId>>,
    dates: Option<Vec<NaiveDateTime>>,
    texts: Option<Vec<String>>,
}

impl RawArchive {
    fn read(path: &Path) -> TopicResult<Self> {
        let archive = Archive::open(path)?;

        let (key, vectors_path) = archive.require(DOCUMENT_VECTOR_KEYS)?;
        debug!(key, "reading document vectors");
        let vectors = archive.read_matrix(vectors_path)?;

        let vocabulary = match (archive.find(WORD_VECTOR_KEYS), archive.find(VOCABULARY_KEYS)) {
            (Some((_, vectors_path)), Some((_, tokens_path))) => {
                let word_vectors = archive.read_matrix(vectors_path)?;
                let tokens: Vec<String> = archive.read_json(tokens_path)?;
                Some(Vocabulary::new(tokens, word_vectors)?)
            }
            (None, None) => None,
            (Some(_), None) => return Err(archive.missing(VOCABULARY_KEYS)),
            (None, Some(_)) => return Err(archive.missing(WORD_VECTOR_KEYS)),
        };

        let ids = match archive.find(DOC_ID_KEYS) {
            Some((_, ids_path)) => {
                let raw: Vec<serde_json::Value> = archive.read_json(ids_path)?;
                Some(parse_ids(raw, ids_path)?)
            }
            None => None,
        };

        let dates = match archive.find(PUB_DATE_KEYS) {
            Some((_, dates_path)) => {
                let raw: Vec<String> = archive.read_json(dates_path)?;
                Some(parse_dates(&raw, dates_path)?)
            }
            None => None,
        };

        let texts = match archive.find(TEXT_KEYS) {
            Some((_, texts_path)) => Some(archive.read_json(texts_path)?),
            None => None,
        };

        Ok(Self {
            archive,
            vectors,
            vocabulary,
            ids,
            dates,
            texts,
        })
    }
}

fn parse_ids(raw: Vec<serde_json::Value>, path: &Path) -> TopicResult<Vec<DocumentId>> {
    raw.into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            serde_json::Value::String(s) => Ok(DocumentId::new(s)),
            serde_json::Value::Number(n) => Ok(DocumentId::new(n.to_string())),
            other => Err(TopicError::MalformedInput {
                origin: format!("{} row {row}", path.display()),
                reason: format!("document id must be a string or integer, found {other}"),
            }),
        })
        .collect()
}

fn parse_dates(raw: &[String], path: &Path) -> TopicResult<Vec<NaiveDateTime>> {
    raw.iter()
        .enumerate()
        .map(|(row, value)| {
            parse_timestamp(value).ok_or_else(|| TopicError::MalformedInput {
                origin: format!("{} row {row}", path.display()),
                reason: format!("cannot parse publication date '{value}'"),
            })
        })
        .collect()
}

fn positional_ids(count: usize, origin: &Path) -> Vec<DocumentId> {
    warn!(
        archive = %origin.display(),
        "no document ids found, using row positions as document ids"
    );
    (0..count).map(DocumentId::positional).collect()
}

/// Documents plus vocabulary, with a batch cursor over the document vectors.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    documents: DocumentTable,
    vocabulary: Option<Vocabulary>,
    cursor: usize,
}

impl EmbeddingStore {
    pub fn from_parts(documents: DocumentTable, vocabulary: Option<Vocabulary>) -> Self {
        Self {
            documents,
            vocabulary,
            cursor: 0,
        }
    }

    /// Load an archive directory.
    ///
    /// Fails with `MissingKey` when no document-vector array is present, or
    /// when publication dates are missing. Missing ids fall back to row
    /// positions with a warning.
    pub fn load(path: &Path) -> TopicResult<Self> {
        let raw = RawArchive::read(path)?;
        let rows = raw.vectors.rows();

        let ids = match raw.ids {
            Some(ids) => ids,
            None => positional_ids(rows, path),
        };
        let dates = match raw.dates {
            Some(dates) => dates,
            None => return Err(raw.archive.missing(PUB_DATE_KEYS)),
        };

        let documents = DocumentTable::new(ids, dates, raw.texts, raw.vectors)?;
        info!(
            documents = documents.len(),
            dim = documents.vectors().dim(),
            vocabulary = raw.vocabulary.as_ref().map_or(0, Vocabulary::len),
            "loaded embedding archive"
        );
        Ok(Self::from_parts(documents, raw.vocabulary))
    }

    /// Load an archive and take ids, dates and texts from the corpus CSV.
    ///
    /// The CSV must have exactly one row per document vector.
    pub fn load_with_corpus(
        path: &Path,
        corpus_path: &Path,
        columns: &CorpusColumns,
    ) -> TopicResult<Self> {
        let raw = RawArchive::read(path)?;
        let corpus = read_corpus(corpus_path, columns)?;
        if corpus.len() != raw.vectors.rows() {
            return Err(TopicError::misaligned(
                format!("corpus rows in {}", corpus_path.display()),
                raw.vectors.rows(),
                corpus.len(),
            ));
        }

        let documents =
            DocumentTable::new(corpus.ids, corpus.dates, Some(corpus.texts), raw.vectors)?;
        info!(
            documents = documents.len(),
            corpus = %corpus_path.display(),
            "loaded embedding archive joined with corpus"
        );
        Ok(Self::from_parts(documents, raw.vocabulary))
    }

    /// Build a store by draining an embedding source.
    pub fn from_source(
        records: CorpusRecords,
        source: &mut dyn EmbeddingSource,
        batch_size: usize,
        on_batch: &mut dyn FnMut(usize),
    ) -> TopicResult<Self> {
        if source.remaining() != records.len() {
            return Err(TopicError::misaligned(
                "embedding source",
                records.len(),
                source.remaining(),
            ));
        }
        let vectors = source.drain(batch_size, on_batch)?;
        let documents = DocumentTable::new(records.ids, records.dates, Some(records.texts), vectors)?;
        Ok(Self::from_parts(documents, None))
    }

    pub fn documents(&self) -> &DocumentTable {
        &self.documents
    }

    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }

    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn into_parts(self) -> (DocumentTable, Option<Vocabulary>) {
        (self.documents, self.vocabulary)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Subset published within `range`; the cursor of the result starts at 0.
    pub fn filter_by_date_range(&self, range: &DateRange) -> Self {
        let documents = self.documents.filter_by_date_range(range);
        info!(
            before = self.documents.len(),
            after = documents.len(),
            start = %range.start,
            end = %range.end,
            "filtered documents by date"
        );
        Self::from_parts(documents, self.vocabulary.clone())
    }

    /// Documents published from January 1st of `start_year` to December 31st of `end_year`.
    pub fn filter_by_years(&self, start_year: i32, end_year: i32) -> TopicResult<Self> {
        Ok(self.filter_by_date_range(&DateRange::years(start_year, end_year)?))
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Write the store in the archive layout, readable by [`EmbeddingStore::load`].
    pub fn save(&self, writer: &ArchiveWriter) -> TopicResult<()> {
        write_archive(writer, &self.documents, self.vocabulary.as_ref())
    }
}

/// Write a document table and optional vocabulary under the canonical key names.
pub fn write_archive(
    writer: &ArchiveWriter,
    documents: &DocumentTable,
    vocabulary: Option<&Vocabulary>,
) -> TopicResult<()> {
    writer.write_matrix(DOCUMENT_VECTOR_KEYS[0], documents.vectors())?;
    writer.write_json(DOC_ID_KEYS[0], documents.ids())?;
    let dates: Vec<String> = documents
        .dates()
        .iter()
        .map(|d| d.format(TIMESTAMP_FORMAT).to_string())
        .collect();
    writer.write_json(PUB_DATE_KEYS[0], &dates)?;
    if let Some(texts) = documents.texts() {
        writer.write_json(TEXT_KEYS[0], texts)?;
    }
    if let Some(vocabulary) = vocabulary {
        writer.write_matrix(WORD_VECTOR_KEYS[0], vocabulary.vectors())?;
        writer.write_json(VOCABULARY_KEYS[0], vocabulary.tokens())?;
    }
    Ok(())
}

impl EmbeddingSource for EmbeddingStore {
    fn next_batch(&mut self, n: usize) -> TopicResult<Matrix> {
        let end = (self.cursor + n).min(self.documents.len());
        let batch = self.documents.vectors().slice_rows(self.cursor, end);
        self.cursor = end;
        Ok(batch)
    }

    fn remaining(&self) -> usize {
        self.documents.len() - self.cursor
    }

    fn dimension(&self) -> usize {
        self.documents.vectors().dim()
    }
}
