//! Shader source analysis for shadelive.
//!
//! The crate turns a shader file on disk into everything the reload pipeline
//! needs before it touches the GPU:
//!
//! ```text
//!   shader.hlsl ──▶ Preprocessor ──▶ preprocessed text ──┬─▶ extract_schema()    ─▶ UniformSchema
//!        │               │                              └─▶ texture_declarations ─▶ [PathBuf]
//!        └───────────────┴─▶ FileDependencySet (always, even on failure)
//! ```
//!
//! `ShaderSourceAnalyzer` owns the preprocessor choice. Failures still carry
//! the dependency set gathered so far so the file watcher can keep observing
//! every included file while the user fixes the error.

mod deps;
mod error;
mod path;
mod preprocess;
mod schema;
mod textures;

use std::path::{Path, PathBuf};

pub use deps::{parse_depfile, scan_includes, FileDependencySet};
pub use error::{PreprocessError, SchemaError};
pub use path::{absolutize, normalize_lexically};
pub use preprocess::{
    BoxedPreprocessor, CommandPreprocessor, PassthroughPreprocessor, PreprocessOutput,
    Preprocessor,
};
pub use schema::{
    extract_schema, ComponentType, UniformDecl, UniformRange, UniformSchema, UniformStyle,
};
pub use textures::texture_declarations;

/// Result of a successful preprocessing step.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub source_path: PathBuf,
    pub preprocessed: String,
    pub dependencies: FileDependencySet,
}

impl Analysis {
    /// Extracts the uniform schema from the preprocessed text.
    pub fn schema(&self) -> Result<UniformSchema, SchemaError> {
        extract_schema(&self.preprocessed)
    }

    /// Declared texture assets, resolved against the shader's directory.
    pub fn textures(&self) -> Vec<PathBuf> {
        let base = self
            .source_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        texture_declarations(&self.preprocessed, &base)
    }
}

/// A failed analysis still reports which files were involved.
#[derive(Debug)]
pub struct AnalysisFailure {
    pub error: PreprocessError,
    pub dependencies: FileDependencySet,
}

pub struct ShaderSourceAnalyzer {
    preprocessor: BoxedPreprocessor,
}

impl ShaderSourceAnalyzer {
    pub fn new(preprocessor: BoxedPreprocessor) -> Self {
        Self { preprocessor }
    }

    /// Analyzer that reads sources verbatim and discovers includes by scanning.
    pub fn passthrough() -> Self {
        Self::new(Box::new(PassthroughPreprocessor))
    }

    pub fn analyze(&self, path: &Path) -> Result<Analysis, AnalysisFailure> {
        let source_path = absolutize(path);
        let mut dependencies = FileDependencySet::new();
        dependencies.insert(&source_path);

        match self.preprocessor.preprocess(&source_path) {
            Ok(output) => {
                match output.dependencies {
                    Some(found) => {
                        for dep in found {
                            dependencies.insert(&dep);
                        }
                    }
                    None => dependencies.extend(scan_includes(&source_path)),
                }
                tracing::debug!(
                    shader = %source_path.display(),
                    dependencies = dependencies.len(),
                    bytes = output.source.len(),
                    "preprocessed shader source"
                );
                Ok(Analysis {
                    source_path,
                    preprocessed: output.source,
                    dependencies,
                })
            }
            Err(error) => {
                dependencies.extend(scan_includes(&source_path));
                tracing::debug!(
                    shader = %source_path.display(),
                    dependencies = dependencies.len(),
                    "preprocessing failed; using scanned include set"
                );
                Err(AnalysisFailure {
                    error,
                    dependencies,
                })
            }
        }
    }
}
