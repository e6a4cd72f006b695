use std::path::PathBuf;

use thiserror::Error;

/// A line of the persisted uniform file could not be understood.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("line {line}: {reason}")]
pub struct PersistFileParseError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to access uniform file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed uniform file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: PersistFileParseError,
    },
    #[error("no uniform file configured")]
    NoPath,
}
