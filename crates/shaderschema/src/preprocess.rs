use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::deps::parse_depfile;
use crate::error::PreprocessError;

/// Expanded source plus the include set, when the tool reports one.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    pub source: String,
    /// `None` means the caller should discover includes itself.
    pub dependencies: Option<Vec<PathBuf>>,
}

/// Abstraction over the macro/include expansion step.
pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, path: &Path) -> Result<PreprocessOutput, PreprocessError>;
}

/// Convenient alias for owning preprocessors behind trait objects.
pub type BoxedPreprocessor = Box<dyn Preprocessor + Send + Sync>;

/// Reads the shader verbatim. Includes are left for the compiler to resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughPreprocessor;

impl Preprocessor for PassthroughPreprocessor {
    fn preprocess(&self, path: &Path) -> Result<PreprocessOutput, PreprocessError> {
        let source = fs::read_to_string(path)
            .map_err(|err| PreprocessError::new(path, format!("failed to read shader: {err}")))?;
        Ok(PreprocessOutput {
            source,
            dependencies: None,
        })
    }
}

/// Runs an external C-style preprocessor.
///
/// Arguments may contain `{input}` and `{depfile}` placeholders. The expanded
/// source is read from stdout; the dependency list from the depfile if the
/// tool wrote one.
#[derive(Debug, Clone)]
pub struct CommandPreprocessor {
    program: String,
    args: Vec<String>,
}

impl CommandPreprocessor {
    pub const DEFAULT_PROGRAM: &'static str = "cpp";

    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `cpp -E -P -C -MD -MF {depfile} {input}`; `-C` keeps the annotation comments.
    pub fn default_args() -> Vec<String> {
        ["-E", "-P", "-C", "-MD", "-MF", "{depfile}", "{input}"]
            .iter()
            .map(|arg| arg.to_string())
            .collect()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn expand_args(&self, input: &Path, depfile: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{depfile}", &depfile.to_string_lossy())
            })
            .collect()
    }
}

impl Default for CommandPreprocessor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM, Self::default_args())
    }
}

impl Preprocessor for CommandPreprocessor {
    fn preprocess(&self, path: &Path) -> Result<PreprocessOutput, PreprocessError> {
        let depfile = tempfile::Builder::new()
            .prefix("shadelive-")
            .suffix(".d")
            .tempfile()
            .map_err(|err| PreprocessError::new(path, format!("failed to create depfile: {err}")))?;
        let args = self.expand_args(path, depfile.path());
        let mut command = Command::new(&self.program);
        command.args(&args);
        if let Some(dir) = path.parent() {
            command.current_dir(dir);
        }
        tracing::debug!(program = %self.program, ?args, "running preprocessor");

        let output = command.output().map_err(|err| {
            PreprocessError::new(path, format!("failed to launch '{}': {err}", self.program))
        })?;

        if !output.status.success() {
            let diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if diagnostics.is_empty() {
                format!("'{}' exited with {}", self.program, output.status)
            } else {
                diagnostics
            };
            return Err(PreprocessError::new(path, reason));
        }

        let source = String::from_utf8(output.stdout).map_err(|err| {
            PreprocessError::new(path, format!("preprocessor produced invalid UTF-8: {err}"))
        })?;
        let dependencies = fs::read_to_string(depfile.path())
            .ok()
            .filter(|contents| !contents.trim().is_empty())
            .map(|contents| parse_depfile(&contents));

        Ok(PreprocessOutput {
            source,
            dependencies,
        })
    }
}
