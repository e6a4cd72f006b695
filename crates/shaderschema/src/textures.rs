use std::path::{Path, PathBuf};

use crate::path::normalize_lexically;

/// Collects `// @texture '<path>'` (or double-quoted) declarations in source order.
///
/// Relative paths resolve against `base_dir`; the index in the returned list is
/// the binding index the shader samples the texture at.
pub fn texture_declarations(source: &str, base_dir: &Path) -> Vec<PathBuf> {
    source
        .lines()
        .filter_map(texture_path)
        .map(|raw| {
            let path = Path::new(raw);
            if path.is_absolute() {
                normalize_lexically(path)
            } else {
                normalize_lexically(&base_dir.join(path))
            }
        })
        .collect()
}

fn texture_path(line: &str) -> Option<&str> {
    let comment = &line[line.find("//")? + 2..];
    let rest = comment.trim_start().strip_prefix("@texture")?.trim_start();
    let quote = rest.chars().next().filter(|ch| *ch == '\'' || *ch == '"')?;
    let inner = &rest[1..];
    let end = inner.find(quote)?;
    let path = &inner[..end];
    if path.trim().is_empty() {
        tracing::warn!(line, "ignoring empty @texture declaration");
        return None;
    }
    Some(path)
}
