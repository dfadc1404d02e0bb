use std::io;

use thiserror::Error;

/// A 1-based line/column position inside an expansion script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum TejsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Shortcut-file error in {identity}: {message}")]
    Parse { identity: String, message: String },
    #[error("No shortcut matches \"{0}\"")]
    NoMatch(String),
    #[error("Script syntax error at {position}: {message}")]
    ScriptSyntax {
        position: SourcePosition,
        message: String,
    },
    #[error("Script runtime error: {message}")]
    ScriptRuntime {
        position: Option<SourcePosition>,
        message: String,
    },
    #[error("Permission denied: {0}")]
    Permission(String),
    /// The failure has already been reported (or reporting was silenced).
    /// Callers should unwind without reporting again.
    #[error("Expansion failed (already reported)")]
    AlreadyReported,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Error: {0}")]
    Other(String),
}

impl TejsError {
    pub fn is_already_reported(&self) -> bool {
        matches!(self, TejsError::AlreadyReported)
    }
}

pub type Result<T> = std::result::Result<T, TejsError>;
