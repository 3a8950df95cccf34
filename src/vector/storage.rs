//! Binary matrix files for document and word vectors.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic `ETVM`, format version, dimension, row count
//! - Rows: contiguous f32 values in little-endian format
//!
//! Files are read through a memory map and copied into a [`Matrix`]; the
//! row order on disk is the row order of the owning table.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use memmap2::MmapOptions;
use thiserror::Error;

use crate::vector::types::{Matrix, VectorError};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify matrix files.
const MAGIC_BYTES: &[u8; 4] = b"ETVM";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Errors specific to matrix storage operations.
#[derive(Error, Debug)]
pub enum VectorStorageError {
    #[error("IO error on '{path}': {source}")]
    Io { path: String, source: io::Error },

    #[error("Invalid matrix file '{path}': {reason}")]
    InvalidFormat { path: String, reason: String },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

impl VectorStorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn invalid(path: &Path, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Reader/writer for the on-disk matrix format.
pub struct MatrixFile;

impl MatrixFile {
    /// Writes a matrix to `path`, replacing any existing file.
    pub fn write(path: &Path, matrix: &Matrix) -> Result<(), VectorStorageError> {
        let rows = u32::try_from(matrix.rows())
            .map_err(|_| VectorStorageError::invalid(path, "row count exceeds u32"))?;
        let dim = u32::try_from(matrix.dim())
            .map_err(|_| VectorStorageError::invalid(path, "dimension exceeds u32"))?;

        let file = File::create(path).map_err(|e| VectorStorageError::io(path, e))?;
        let mut writer = BufWriter::new(file);

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(MAGIC_BYTES);
        header[4..8].copy_from_slice(&STORAGE_VERSION.to_le_bytes());
        header[8..12].copy_from_slice(&dim.to_le_bytes());
        header[12..16].copy_from_slice(&rows.to_le_bytes());

        let write_all = |writer: &mut BufWriter<File>| -> io::Result<()> {
            writer.write_all(&header)?;
            for &value in matrix.as_slice() {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()
        };
        write_all(&mut writer).map_err(|e| VectorStorageError::io(path, e))
    }

    /// Reads a matrix written by [`MatrixFile::write`].
    pub fn read(path: &Path) -> Result<Matrix, VectorStorageError> {
        let file = File::open(path).map_err(|e| VectorStorageError::io(path, e))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| VectorStorageError::io(path, e))?;

        if mmap.len() < HEADER_SIZE {
            return Err(VectorStorageError::invalid(path, "file too small for header"));
        }
        if &mmap[0..4] != MAGIC_BYTES {
            return Err(VectorStorageError::invalid(path, "bad magic bytes"));
        }

        let read_u32 = |offset: usize| {
            u32::from_le_bytes([
                mmap[offset],
                mmap[offset + 1],
                mmap[offset + 2],
                mmap[offset + 3],
            ])
        };
        let version = read_u32(4);
        if version != STORAGE_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            }
            .into());
        }
        let dim = read_u32(8) as usize;
        let rows = read_u32(12) as usize;

        let expected_len = HEADER_SIZE + rows * dim * BYTES_PER_F32;
        if mmap.len() != expected_len {
            return Err(VectorStorageError::invalid(
                path,
                format!(
                    "expected {expected_len} bytes for {rows}x{dim}, found {}",
                    mmap.len()
                ),
            ));
        }

        let data: Vec<f32> = mmap[HEADER_SIZE..]
            .chunks_exact(BYTES_PER_F32)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Matrix::new(data, dim)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_matrix() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("document_vectors.vec");

        let matrix = Matrix::from_rows(vec![vec![0.5, -1.0, 2.0], vec![3.25, 0.0, -0.125]]).unwrap();
        MatrixFile::write(&path, &matrix).unwrap();

        let loaded = MatrixFile::read(&path).unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.vec");

        let matrix = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        MatrixFile::write(&path, &matrix).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        assert!(matches!(
            MatrixFile::read(&path),
            Err(VectorStorageError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("junk.vec");
        std::fs::write(&path, [0u8; 32]).unwrap();

        assert!(MatrixFile::read(&path).is_err());
    }
}
