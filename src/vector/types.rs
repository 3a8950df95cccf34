//! Core vector types: dimensions, the row-major [`Matrix`] and vector errors.

use thiserror::Error;

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent dimension
/// mismatches between document vectors, word vectors and centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Dense row-major matrix of `f32` values.
///
/// Rows are embeddings; row `i` always belongs to document (or vocabulary
/// entry) `i` of the table that owns the matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f32>,
    dimension: VectorDimension,
}

impl Matrix {
    /// Wraps a flat buffer. `data.len()` must be a multiple of `dim`.
    pub fn new(data: Vec<f32>, dim: usize) -> Result<Self, VectorError> {
        let dimension = VectorDimension::new(dim)?;
        if data.len() % dim != 0 {
            return Err(VectorError::InvalidDimension {
                dimension: dim,
                reason: "Buffer length is not a multiple of the dimension",
            });
        }
        Ok(Self { data, dimension })
    }

    /// An empty matrix with a fixed row width.
    pub fn empty(dim: usize) -> Result<Self, VectorError> {
        Self::new(Vec::new(), dim)
    }

    /// Builds a matrix from owned rows, checking they share one dimension.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, VectorError> {
        let Some(first) = rows.first() else {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Cannot infer dimension from zero rows",
            });
        };
        let dimension = VectorDimension::new(first.len())?;
        let mut data = Vec::with_capacity(rows.len() * dimension.get());
        for row in &rows {
            dimension.validate_vector(row)?;
            data.extend_from_slice(row);
        }
        Ok(Self { data, dimension })
    }

    pub fn zeros(rows: usize, dim: usize) -> Result<Self, VectorError> {
        Self::new(vec![0.0; rows * dim], dim)
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.data.len() / self.dimension.get()
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dimension.get()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row `i`. Panics when out of bounds, like slice indexing.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        let dim = self.dimension.get();
        &self.data[i * dim..(i + 1) * dim]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        let dim = self.dimension.get();
        &mut self.data[i * dim..(i + 1) * dim]
    }

    pub fn iter_rows(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dimension.get())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Copies the given rows, in the given order, into a new matrix.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.dim());
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            data,
            dimension: self.dimension,
        }
    }

    /// Copies rows `start..end` into a new matrix.
    #[must_use]
    pub fn slice_rows(&self, start: usize, end: usize) -> Matrix {
        let dim = self.dim();
        Matrix {
            data: self.data[start * dim..end * dim].to_vec(),
            dimension: self.dimension,
        }
    }

    /// Appends the rows of `other`, which must have the same dimension.
    pub fn extend(&mut self, other: &Matrix) -> Result<(), VectorError> {
        if other.dim() != self.dim() {
            return Err(VectorError::DimensionMismatch {
                expected: self.dim(),
                actual: other.dim(),
            });
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Appends a single row.
    pub fn push_row(&mut self, row: &[f32]) -> Result<(), VectorError> {
        self.dimension.validate_vector(row)?;
        self.data.extend_from_slice(row);
        Ok(())
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure document and word vectors come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Retrain the model with this version of econtopics"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}
