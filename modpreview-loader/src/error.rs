//! Error types for loader and cache operations
//!
//! Every error is `Clone`: a single failed computation is delivered to each
//! caller awaiting the same shared future.

use crate::loader::Position;
use thiserror::Error;

/// Main error type for the loading framework
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// Resource missing or unreadable
    #[error("Cannot read {resource}: {message}")]
    Io { resource: String, message: String },

    /// Analysis rejected the content of a resource
    #[error("Parse error in {resource}{}: {message}", format_position(.position))]
    Parse {
        resource: String,
        position: Option<Position>,
        message: String,
    },

    /// The session was cancelled while the load was in flight
    #[error("Load cancelled")]
    Cancelled,

    /// Resource variant recognized but not handled
    #[error("Unsupported format for {resource}: {format}")]
    UnsupportedFormat { resource: String, format: String },

    /// A loader was revisited in one session before it ever produced a result
    #[error("Loader {loader} was revisited before producing a result")]
    Cycle { loader: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

fn format_position(position: &Option<Position>) -> String {
    match position {
        Some(p) => format!(" at {}:{}", p.line, p.column),
        None => String::new(),
    }
}

impl LoaderError {
    pub fn io(resource: impl Into<String>, err: impl std::fmt::Display) -> Self {
        LoaderError::Io {
            resource: resource.into(),
            message: err.to_string(),
        }
    }

    pub fn parse(resource: impl Into<String>, message: impl Into<String>) -> Self {
        LoaderError::Parse {
            resource: resource.into(),
            position: None,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoaderError::Cancelled)
    }

    pub fn is_io(&self) -> bool {
        matches!(self, LoaderError::Io { .. })
    }
}

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

impl From<String> for LoaderError {
    fn from(s: String) -> Self {
        LoaderError::Other(s)
    }
}

impl From<&str> for LoaderError {
    fn from(s: &str) -> Self {
        LoaderError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LoaderError::io("map/definition.csv", "No such file or directory");
        assert_eq!(
            error.to_string(),
            "Cannot read map/definition.csv: No such file or directory"
        );

        let parse_error = LoaderError::Parse {
            resource: "common/technologies/infantry.txt".to_string(),
            position: Some(Position { line: 12, column: 4 }),
            message: "unexpected '}'".to_string(),
        };
        assert!(parse_error.to_string().contains("at 12:4"));

        let unsupported = LoaderError::UnsupportedFormat {
            resource: "gfx/flag.bmp".to_string(),
            format: "bmp".to_string(),
        };
        assert!(unsupported.to_string().contains("bmp"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(LoaderError::Cancelled.is_cancelled());
        assert!(LoaderError::io("a", "b").is_io());
        assert!(!LoaderError::parse("a", "b").is_io());
    }

    #[test]
    fn test_error_conversion() {
        let error: LoaderError = "test error".into();
        assert!(matches!(error, LoaderError::Other(_)));

        let error: LoaderError = "test error".to_string().into();
        assert!(matches!(error, LoaderError::Other(_)));
    }
}
