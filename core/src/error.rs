//! Error types for the nmapkit-core library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::tool::ToolVersion;

/// Result type alias for nmapkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring, running, or parsing a scan.
#[derive(Error, Debug)]
pub enum Error {
    /// The nmap binary could not be located.
    #[error("nmap binary not found (searched: {})", display_paths(.searched))]
    ToolNotFound { searched: Vec<PathBuf> },

    /// The nmap binary reported a version older than the supported minimum,
    /// or a version string that could not be understood.
    #[error("Unsupported nmap version {found} (minimum {minimum})")]
    UnsupportedVersion { found: String, minimum: ToolVersion },

    /// Options were invalid or conflicted with each other.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The tool exited with a non-zero status.
    #[error("nmap exited with {}: {stderr}", display_code(.code))]
    ProcessExecution { code: Option<i32>, stderr: String },

    /// The output ended before the document was complete.
    #[error("Truncated output at byte {offset}: {context}")]
    TruncatedOutput { offset: u64, context: String },

    /// The output was structurally invalid.
    #[error("Malformed output at byte {offset} in <{element}>: {reason}")]
    MalformedOutput {
        offset: u64,
        element: String,
        reason: String,
    },

    /// The run was cancelled by the caller.
    #[error("Scan cancelled")]
    Cancelled,

    /// The run exceeded its configured timeout.
    #[error("Scan timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to start the tool or its background tasks.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisted configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn malformed(
        offset: u64,
        element: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::MalformedOutput {
            offset,
            element: element.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn truncated(offset: u64, context: impl Into<String>) -> Self {
        Error::TruncatedOutput {
            offset,
            context: context.into(),
        }
    }

    /// Returns true for errors raised while reading the tool's output.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::TruncatedOutput { .. } | Error::MalformedOutput { .. }
        )
    }

    /// Returns true if the run was stopped by the caller or by its timeout.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Timeout(_))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = Error::ProcessExecution {
            code: Some(1),
            stderr: "Failed to resolve \"nope\".".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "nmap exited with exit code 1: Failed to resolve \"nope\"."
        );

        let err = Error::malformed(42, "port", "portid out of range");
        assert_eq!(
            err.to_string(),
            "Malformed output at byte 42 in <port>: portid out of range"
        );
        assert!(err.is_parse_error());

        let err = Error::ToolNotFound {
            searched: vec![PathBuf::from("/usr/bin/nmap")],
        };
        assert!(err.to_string().contains("/usr/bin/nmap"));
    }

    #[test]
    fn test_interrupted() {
        assert!(Error::Cancelled.is_interrupted());
        assert!(Error::Timeout(Duration::from_secs(1)).is_interrupted());
        assert!(!Error::Config("x".into()).is_interrupted());
    }
}
