//! Source corpus CSV: texts, publication dates and optional document ids.

use crate::error::{TopicError, TopicResult};
use crate::store::table::parse_timestamp;
use crate::types::DocumentId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Column names of the source corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusColumns {
    #[serde(default = "default_text_column")]
    pub text: String,

    #[serde(default = "default_date_column")]
    pub date: String,

    /// Optional id column; rows are numbered from 0 when it is missing.
    #[serde(default = "default_id_column")]
    pub id: String,
}

fn default_text_column() -> String {
    "body".to_string()
}
fn default_date_column() -> String {
    "pub_date".to_string()
}
fn default_id_column() -> String {
    "doc_id".to_string()
}

impl Default for CorpusColumns {
    fn default() -> Self {
        Self {
            text: default_text_column(),
            date: default_date_column(),
            id: default_id_column(),
        }
    }
}

/// Parsed corpus columns, row-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusRecords {
    pub ids: Vec<DocumentId>,
    pub dates: Vec<NaiveDateTime>,
    pub texts: Vec<String>,
}

impl CorpusRecords {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Read the corpus CSV.
///
/// Text and date columns are required. A missing id column falls back to
/// positional ids and is logged as a warning.
pub fn read_corpus(path: &Path, columns: &CorpusColumns) -> TopicResult<CorpusRecords> {
    let csv_error = |source: csv::Error| TopicError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_error)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let missing = |name: &str| TopicError::MissingKey {
        archive: path.to_path_buf(),
        expected: vec![name.to_string()],
        present: headers.clone(),
    };
    let text_column = column(&columns.text).ok_or_else(|| missing(&columns.text))?;
    let date_column = column(&columns.date).ok_or_else(|| missing(&columns.date))?;
    let id_column = column(&columns.id);
    if id_column.is_none() {
        warn!(
            column = %columns.id,
            path = %path.display(),
            "corpus has no id column, using row positions as document ids"
        );
    }

    let mut records = CorpusRecords {
        ids: Vec::new(),
        dates: Vec::new(),
        texts: Vec::new(),
    };
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let field = |index: usize| record.get(index).unwrap_or_default();

        let raw_date = field(date_column);
        let date = parse_timestamp(raw_date).ok_or_else(|| TopicError::MalformedInput {
            origin: format!("{} row {}", path.display(), row + 1),
            reason: format!("cannot parse {} value '{raw_date}'", columns.date),
        })?;

        let id = match id_column {
            Some(index) => DocumentId::new(field(index).trim()),
            None => DocumentId::positional(row),
        };

        records.ids.push(id);
        records.dates.push(date);
        records.texts.push(field(text_column).to_string());
    }

    info!(rows = records.len(), path = %path.display(), "read corpus");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_corpus_with_ids() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("noticias.csv");
        fs::write(
            &path,
            "doc_id,pub_date,body\n17,2023-01-05,\"La inflación, otra vez\"\n18,2023-02-01 08:00:00,Empleo\n",
        )
        .unwrap();

        let records = read_corpus(&path, &CorpusColumns::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.ids[0].as_str(), "17");
        assert_eq!(records.texts[0], "La inflación, otra vez");
        assert_eq!(records.dates[1].to_string(), "2023-02-01 08:00:00");
    }

    #[test]
    fn test_missing_id_column_falls_back_to_positions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("noticias.csv");
        fs::write(&path, "pub_date,body\n2023-01-05,uno\n2023-01-06,dos\n").unwrap();

        let records = read_corpus(&path, &CorpusColumns::default()).unwrap();
        let ids: Vec<&str> = records.ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
    }

    #[test]
    fn test_missing_text_column_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("noticias.csv");
        fs::write(&path, "pub_date,titulo\n2023-01-05,uno\n").unwrap();

        let err = read_corpus(&path, &CorpusColumns::default()).unwrap_err();
        assert!(matches!(err, TopicError::MissingKey { expected, .. } if expected == vec!["body"]));
    }

    #[test]
    fn test_bad_date_names_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("noticias.csv");
        fs::write(&path, "pub_date,body\n2023-01-05,uno\nayer,dos\n").unwrap();

        let err = read_corpus(&path, &CorpusColumns::default()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }
}
