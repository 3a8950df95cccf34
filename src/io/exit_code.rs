//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - a pipeline stage failed unexpectedly
//! - `3-8`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::TopicError;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Model, topic, document or term not found (code 3)
    NotFound = 3,

    /// Input data or parameters rejected (code 4)
    InvalidInput = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Stored model failed verification (code 7)
    ArtifactCorrupted = 7,

    /// Model name already taken (code 8)
    NameConflict = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Determine exit code for a query based on result presence.
    ///
    /// Returns `Success` if anything was found, `NotFound` if empty.
    pub fn from_results<T>(results: &[T]) -> Self {
        if results.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Convert a `TopicError` to the appropriate exit code.
    ///
    /// Stage wrappers are looked through, so the code reflects the
    /// underlying failure.
    pub fn from_error(error: &TopicError) -> Self {
        match error.root() {
            TopicError::ModelNotFound { .. }
            | TopicError::TopicNotFound { .. }
            | TopicError::DocumentNotFound { .. }
            | TopicError::UnknownTerm { .. } => ExitCode::NotFound,

            TopicError::MissingKey { .. }
            | TopicError::MisalignedArrays { .. }
            | TopicError::InvalidParameter { .. }
            | TopicError::DuplicateKey { .. }
            | TopicError::MalformedInput { .. }
            | TopicError::NoTopicsFound { .. }
            | TopicError::Json { .. }
            | TopicError::Csv { .. } => ExitCode::InvalidInput,

            TopicError::FileRead { .. }
            | TopicError::FileWrite { .. }
            | TopicError::ExportFailed { .. }
            | TopicError::Storage(_) => ExitCode::IoError,

            TopicError::Config { .. } => ExitCode::ConfigError,
            TopicError::ArtifactCorrupted { .. } => ExitCode::ArtifactCorrupted,
            TopicError::NameConflict { .. } => ExitCode::NameConflict,
            TopicError::EmptyCluster { .. } => ExitCode::BlockingError,

            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Stable code string used in JSON responses.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Success => "OK",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::BlockingError => "BLOCKING_ERROR",
            ExitCode::NotFound => "NOT_FOUND",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::IoError => "IO_ERROR",
            ExitCode::ConfigError => "CONFIG_ERROR",
            ExitCode::ArtifactCorrupted => "ARTIFACT_CORRUPTED",
            ExitCode::NameConflict => "NAME_CONFLICT",
        }
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::InvalidInput => "Invalid input",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::ArtifactCorrupted => "Model artifact corrupted",
            ExitCode::NameConflict => "Model name conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Stage, StageContext, TopicResult};
    use std::path::PathBuf;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as u8, 0);
        assert_eq!(ExitCode::NotFound as u8, 3);
        assert_eq!(ExitCode::InvalidInput as u8, 4);
        assert_eq!(ExitCode::IoError as u8, 5);
        assert_eq!(ExitCode::ConfigError as u8, 6);
        assert_eq!(ExitCode::ArtifactCorrupted as u8, 7);
        assert_eq!(ExitCode::NameConflict as u8, 8);
    }

    #[test]
    fn test_from_results() {
        assert_eq!(ExitCode::from_results(&[1]), ExitCode::Success);
        assert_eq!(ExitCode::from_results::<u8>(&[]), ExitCode::NotFound);
    }

    #[test]
    fn test_stage_wrapper_is_transparent() {
        let result: TopicResult<()> = Err(TopicError::NameConflict {
            name: "m".to_string(),
            path: PathBuf::from("models/m"),
        });
        let err = result.in_stage(Stage::Persist).unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NameConflict);

        let err = TopicError::UnknownTerm {
            terms: vec!["zzz".to_string()],
        };
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
    }

    #[test]
    fn test_is_success_and_blocking() {
        assert!(ExitCode::Success.is_success());
        assert!(!ExitCode::NotFound.is_success());
        assert!(ExitCode::BlockingError.is_blocking());
        assert!(!ExitCode::Success.is_blocking());
    }
}
