//! Format definitions for CLI output.
//!
//! Provides the JSON envelope every `--json` command prints, for both
//! results and errors.

use crate::error::TopicError;
use crate::io::exit_code::ExitCode;
use serde::{Deserialize, Serialize};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Text,
    /// JSON for scripts
    Json,
}

impl OutputFormat {
    /// Create format from JSON flag.
    #[must_use]
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    /// Check if format is JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Standard JSON response format.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse<T = serde_json::Value>
where
    T: Serialize,
{
    /// Status: "success" or "error"
    pub status: String,

    /// Result code (e.g., "OK", "NOT_FOUND", "UNKNOWN_TERM")
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Actual data payload (only for success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Error details and suggestions (only for errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,

    /// Exit code for shell scripts
    pub exit_code: u8,

    /// Metadata (execution time, version, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

/// Error details for JSON responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Recovery suggestions
    pub suggestions: Vec<String>,
    /// Pipeline stage that failed, for training errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Response metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Version of the tool
    pub version: String,
    /// Model the response was computed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Execution time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ResponseMeta {
    pub fn new(model: Option<&str>, execution_time_ms: Option<u64>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            model: model.map(str::to_string),
            execution_time_ms,
        }
    }
}

impl<T> JsonResponse<T>
where
    T: Serialize,
{
    /// Create a success response with data.
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            code: "OK".to_string(),
            message: "Operation completed successfully".to_string(),
            data: Some(data),
            error: None,
            exit_code: ExitCode::Success as u8,
            meta: None,
        }
    }

    /// Success envelope with an explicit code, e.g. `NOT_FOUND` for empty results.
    pub fn with_code(mut self, code: ExitCode, message: &str) -> Self {
        self.code = code.code_name().to_string();
        self.exit_code = code as u8;
        self.message = message.to_string();
        self
    }

    /// Add metadata to the response.
    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl JsonResponse<serde_json::Value> {
    /// Create an error response from a `TopicError`.
    pub fn from_error(error: &TopicError) -> Self {
        Self {
            status: "error".to_string(),
            code: error.status_code(),
            message: error.to_string(),
            data: None,
            error: Some(ErrorDetails {
                suggestions: error
                    .recovery_suggestions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                stage: error.stage().map(|s| s.to_string()),
            }),
            exit_code: ExitCode::from_error(error) as u8,
            meta: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Stage, StageContext, TopicResult};

    #[test]
    fn test_output_format_from_flag() {
        assert_eq!(OutputFormat::from_json_flag(true), OutputFormat::Json);
        assert_eq!(OutputFormat::from_json_flag(false), OutputFormat::Text);
    }

    #[test]
    fn test_json_response_success() {
        #[derive(Serialize)]
        struct TopicCount {
            topics: usize,
        }

        let response = JsonResponse::success(TopicCount { topics: 12 });
        assert_eq!(response.status, "success");
        assert_eq!(response.code, "OK");
        assert_eq!(response.exit_code, 0);
        assert!(response.data.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_empty_result_code() {
        let response =
            JsonResponse::success(Vec::<u32>::new()).with_code(ExitCode::NotFound, "No documents");
        assert_eq!(response.code, "NOT_FOUND");
        assert_eq!(response.exit_code, 3);
    }

    #[test]
    fn test_error_response_carries_stage() {
        let result: TopicResult<()> = Err(TopicError::NoTopicsFound { documents: 40 });
        let err = result.in_stage(Stage::Cluster).unwrap_err();

        let response = JsonResponse::from_error(&err);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["code"], "NO_TOPICS_FOUND");
        assert_eq!(json["exit_code"], 4);
        assert_eq!(json["error"]["stage"], "cluster");
        assert!(json.get("data").is_none());
    }
}
