//! Archive directories of named arrays.
//!
//! An archive is a directory where each file is one array: `<key>.vec` for
//! binary f32 matrices and `<key>.json` for JSON arrays. Model bundles use
//! the same layout, so a trained model can be fed back as input.

use crate::error::{IoContext, TopicError, TopicResult};
use crate::vector::{Matrix, MatrixFile};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const MATRIX_EXTENSION: &str = "vec";
const JSON_EXTENSION: &str = "json";

/// Read side of an archive directory.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
    entries: BTreeMap<String, PathBuf>,
}

impl Archive {
    pub fn open(root: &Path) -> TopicResult<Self> {
        let listing = fs::read_dir(root).read_context(root)?;
        let mut entries = BTreeMap::new();
        for entry in listing {
            let path = entry.read_context(root)?.path();
            let extension = path.extension().and_then(|e| e.to_str());
            if !matches!(extension, Some(MATRIX_EXTENSION | JSON_EXTENSION)) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.insert(stem.to_string(), path.clone());
            }
        }
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// First of `candidates` present in the archive.
    pub fn find(&self, candidates: &[&str]) -> Option<(&str, &Path)> {
        candidates.iter().find_map(|key| {
            self.entries
                .get_key_value(*key)
                .map(|(k, path)| (k.as_str(), path.as_path()))
        })
    }

    /// Like [`Archive::find`] but a missing key is an error naming what is there.
    pub fn require(&self, candidates: &[&str]) -> TopicResult<(&str, &Path)> {
        self.find(candidates).ok_or_else(|| self.missing(candidates))
    }

    pub fn missing(&self, candidates: &[&str]) -> TopicError {
        TopicError::MissingKey {
            archive: self.root.clone(),
            expected: candidates.iter().map(|s| s.to_string()).collect(),
            present: self.keys(),
        }
    }

    pub fn read_matrix(&self, path: &Path) -> TopicResult<Matrix> {
        Ok(MatrixFile::read(path)?)
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> TopicResult<T> {
        let content = fs::read_to_string(path).read_context(path)?;
        serde_json::from_str(&content).map_err(|source| TopicError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Write side of an archive directory.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    root: PathBuf,
}

impl ArchiveWriter {
    pub fn create(root: &Path) -> TopicResult<Self> {
        fs::create_dir_all(root).write_context(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_matrix(&self, key: &str, matrix: &Matrix) -> TopicResult<PathBuf> {
        let path = self.root.join(format!("{key}.{MATRIX_EXTENSION}"));
        MatrixFile::write(&path, matrix)?;
        Ok(path)
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> TopicResult<PathBuf> {
        let path = self.root.join(format!("{key}.{JSON_EXTENSION}"));
        let file = fs::File::create(&path).write_context(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value).map_err(|source| TopicError::Json {
            path: path.clone(),
            source,
        })?;
        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .write_context(&path)?;
        file.sync_all().write_context(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_prefers_first_candidate() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::create(temp_dir.path()).unwrap();
        let matrix = Matrix::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        writer.write_matrix("embeddings", &matrix).unwrap();
        writer.write_matrix("document_vectors", &matrix).unwrap();
        writer.write_json("vocab", &["a"]).unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let archive = Archive::open(temp_dir.path()).unwrap();
        assert_eq!(archive.keys(), vec!["document_vectors", "embeddings", "vocab"]);

        let (key, _) = archive.find(&["document_vectors", "embeddings"]).unwrap();
        assert_eq!(key, "document_vectors");
    }

    #[test]
    fn test_missing_key_lists_present_keys() {
        let temp_dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::create(temp_dir.path()).unwrap();
        writer.write_json("vocab", &["a"]).unwrap();

        let archive = Archive::open(temp_dir.path()).unwrap();
        match archive.require(&["document_vectors", "embeddings"]) {
            Err(TopicError::MissingKey {
                expected, present, ..
            }) => {
                assert_eq!(expected, vec!["document_vectors", "embeddings"]);
                assert_eq!(present, vec!["vocab"]);
            }
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }
}
