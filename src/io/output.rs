//! Output management for CLI commands.
//!
//! Handles formatting and display for different output formats,
//! providing a unified interface for text and JSON output.

use crate::display::THEME;
use crate::error::TopicError;
use crate::io::exit_code::ExitCode;
use crate::io::format::{JsonResponse, OutputFormat, ResponseMeta};
use serde::Serialize;
use std::io::{self, Write};

/// Manages output formatting and display.
pub struct OutputManager {
    format: OutputFormat,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
    meta: Option<(Option<String>, std::time::Instant)>,
}

impl OutputManager {
    /// Create a new output manager with the specified format.
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            stdout: Box::new(io::stdout()),
            stderr: Box::new(io::stderr()),
            meta: None,
        }
    }

    /// Create an output manager for testing with custom writers.
    #[cfg(test)]
    pub fn new_with_writers(
        format: OutputFormat,
        stdout: Box<dyn Write>,
        stderr: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            stdout,
            stderr,
            meta: None,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Attach the model name and a start time to JSON responses.
    pub fn with_model(mut self, model: Option<&str>) -> Self {
        self.meta = Some((model.map(str::to_string), std::time::Instant::now()));
        self
    }

    fn response_meta(&self) -> Option<ResponseMeta> {
        self.meta.as_ref().map(|(model, started)| {
            ResponseMeta::new(model.as_deref(), Some(started.elapsed().as_millis() as u64))
        })
    }

    /// Output a result.
    ///
    /// In JSON mode, wraps `data` in a success response. In text mode, prints
    /// what `render` produces.
    pub fn success<T, F>(&mut self, data: &T, render: F) -> io::Result<ExitCode>
    where
        T: Serialize,
        F: FnOnce() -> String,
    {
        self.emit(data, ExitCode::Success, "Operation completed successfully", render)
    }

    /// Output a list of results; an empty list exits with `NotFound`.
    pub fn collection<T, F>(&mut self, items: &[T], entity: &str, render: F) -> io::Result<ExitCode>
    where
        T: Serialize,
        F: FnOnce() -> String,
    {
        if items.is_empty() {
            let message = format!("No {entity} found");
            return match self.format {
                OutputFormat::Json => self.emit(&items, ExitCode::NotFound, &message, String::new),
                OutputFormat::Text => {
                    writeln!(self.stderr, "{message}")?;
                    Ok(ExitCode::NotFound)
                }
            };
        }
        let message = format!("Found {} {entity}", items.len());
        self.emit(&items, ExitCode::Success, &message, render)
    }

    fn emit<T, F>(&mut self, data: &T, code: ExitCode, message: &str, render: F) -> io::Result<ExitCode>
    where
        T: Serialize,
        F: FnOnce() -> String,
    {
        match self.format {
            OutputFormat::Json => {
                let mut response = JsonResponse::success(data).with_code(code, message);
                response.meta = self.response_meta();
                writeln!(self.stdout, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            OutputFormat::Text => {
                writeln!(self.stdout, "{}", render())?;
            }
        }
        Ok(code)
    }

    /// Output an error with suggestions.
    pub fn error(&mut self, error: &TopicError) -> io::Result<ExitCode> {
        match self.format {
            OutputFormat::Json => {
                let mut response = JsonResponse::from_error(error);
                response.meta = self.response_meta();
                writeln!(self.stderr, "{}", serde_json::to_string_pretty(&response)?)?;
            }
            OutputFormat::Text => {
                writeln!(self.stderr, "{}", THEME.error_with_icon(&error.to_string()))?;
                for suggestion in error.recovery_suggestions() {
                    let hint = format!("  Suggestion: {suggestion}");
                    writeln!(self.stderr, "{}", THEME.apply(&THEME.dim, hint))?;
                }
            }
        }
        Ok(ExitCode::from_error(error))
    }
}
