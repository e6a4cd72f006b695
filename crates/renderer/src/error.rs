use std::path::PathBuf;

use shaderschema::{PreprocessError, SchemaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to launch shader compiler `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("shader compilation failed:\n{diagnostics}")]
    Diagnostics { diagnostics: String },
    #[error("failed to stage shader compilation: {0}")]
    Io(#[from] std::io::Error),
    #[error("compiler output is not valid SPIR-V: {0}")]
    InvalidModule(String),
    #[error("shader must define at least one fragment entry point named pass0")]
    NoPasses,
    #[error("GPU rejected shader: {0}")]
    Gpu(String),
}

/// One or more declared textures failed to load.
#[derive(Debug, Error)]
#[error("{}", render_failures(.failures))]
pub struct TextureLoadError {
    pub failures: Vec<(PathBuf, String)>,
}

fn render_failures(failures: &[(PathBuf, String)]) -> String {
    failures
        .iter()
        .map(|(path, reason)| format!("failed to load texture {}: {reason}", path.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
#[error("failed to allocate {what}: {reason}")]
pub struct BufferAllocationError {
    pub what: String,
    pub reason: String,
}

impl BufferAllocationError {
    pub fn new(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

/// Everything that can stop a reload from publishing a new generation.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("invalid uniform block: {0}")]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Texture(#[from] TextureLoadError),
    #[error(transparent)]
    Allocation(#[from] BufferAllocationError),
}

impl ReloadError {
    /// Short, multi-line text suitable for a window title or overlay.
    pub fn diagnostic(&self) -> String {
        self.to_string()
    }
}
