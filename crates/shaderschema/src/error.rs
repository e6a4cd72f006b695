use std::path::PathBuf;

use thiserror::Error;

/// Macro expansion or include resolution failed.
#[derive(Debug, Clone, Error)]
#[error("failed to preprocess {}: {reason}", path.display())]
pub struct PreprocessError {
    pub reason: String,
    pub path: PathBuf,
}

impl PreprocessError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("uniform struct '{0}' opened on line {1} is never closed with '}};'")]
    Unterminated(String, usize),
    #[error("line {line}: unknown uniform type '{type_name}' for '{name}'")]
    UnknownType {
        line: usize,
        type_name: String,
        name: String,
    },
    #[error("line {line}: malformed @range annotation for '{name}': {reason}")]
    MalformedRange {
        line: usize,
        name: String,
        reason: String,
    },
    #[error("line {line}: uniform '{name}' is declared twice")]
    Duplicate { line: usize, name: String },
}
