//! Lexical path helpers shared by include scanning and texture resolution.
//!
//! Paths are normalised without touching the filesystem so declarations that
//! point at files which do not exist yet still resolve to stable, comparable
//! absolute paths.
use std::env;
use std::path::{Component, Path, PathBuf};

/// Makes `path` absolute against the working directory and removes `.`/`..`.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_lexically(path);
    }
    match env::current_dir() {
        Ok(cwd) => normalize_lexically(&cwd.join(path)),
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "cannot resolve working directory");
            normalize_lexically(path)
        }
    }
}

/// Collapses `.` and `..` segments. `..` above the root is dropped.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    _ => false,
                };
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_dot_segments() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/./c/../d.png")),
            PathBuf::from("/a/b/d.png")
        );
        assert_eq!(
            normalize_lexically(Path::new("/a/../../x")),
            PathBuf::from("/x")
        );
        assert_eq!(
            normalize_lexically(Path::new("../x/./y")),
            PathBuf::from("../x/y")
        );
    }

    #[test]
    fn absolutize_keeps_absolute_paths() {
        assert_eq!(
            absolutize(Path::new("/tmp/./shader.hlsl")),
            PathBuf::from("/tmp/shader.hlsl")
        );
        assert!(absolutize(Path::new("shader.hlsl")).is_absolute());
    }
}
