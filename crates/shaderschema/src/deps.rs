//! Dependency discovery for the file watcher.
//!
//! Types:
//!
//! - `FileDependencySet` keeps absolute paths in first-seen order without
//!   duplicates; the shader itself is always the first entry.
//!
//! Functions:
//!
//! - `parse_depfile` reads the Make-style rule a C preprocessor writes with
//!   `-MD -MF <file>`.
//! - `scan_includes` follows `#include` directives directly. It is the
//!   fallback when the preprocessor fails or does not emit a depfile.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::path::{absolutize, normalize_lexically};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDependencySet {
    paths: Vec<PathBuf>,
}

impl FileDependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `path` (made absolute) unless already present. Returns whether it was new.
    pub fn insert(&mut self, path: &Path) -> bool {
        let absolute = absolutize(path);
        if self.paths.contains(&absolute) {
            return false;
        }
        self.paths.push(absolute);
        true
    }

    pub fn extend<I: IntoIterator<Item = PathBuf>>(&mut self, paths: I) {
        for path in paths {
            self.insert(&path);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|candidate| candidate == path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Parses a Make rule (`target: dep dep \` continuation lines) into its prerequisites.
pub fn parse_depfile(contents: &str) -> Vec<PathBuf> {
    let joined = contents.replace("\\\r\n", " ").replace("\\\n", " ");
    let mut deps = Vec::new();
    for rule in joined.lines() {
        let Some(prerequisites) = split_rule(rule) else {
            continue;
        };
        let mut current = String::new();
        let mut chars = prerequisites.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' if chars.peek() == Some(&' ') => {
                    current.push(' ');
                    chars.next();
                }
                ch if ch.is_whitespace() => {
                    if !current.is_empty() {
                        deps.push(PathBuf::from(std::mem::take(&mut current)));
                    }
                }
                other => current.push(other),
            }
        }
        if !current.is_empty() {
            deps.push(PathBuf::from(current));
        }
    }
    deps
}

// Finds the ':' that separates target from prerequisites, skipping drive letters.
fn split_rule(rule: &str) -> Option<&str> {
    let bytes = rule.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        if *byte != b':' {
            continue;
        }
        let is_drive = index == 1 && bytes[0].is_ascii_alphabetic();
        if is_drive {
            continue;
        }
        return Some(&rule[index + 1..]);
    }
    None
}

/// Follows `#include "x"` / `#include <x>` relative to each including file.
///
/// Missing files are skipped; cycles terminate because each file is visited once.
pub fn scan_includes(root: &Path) -> Vec<PathBuf> {
    let mut visited = HashSet::new();
    let mut found = Vec::new();
    visit(&absolutize(root), &mut visited, &mut found);
    found
}

fn visit(file: &Path, visited: &mut HashSet<PathBuf>, found: &mut Vec<PathBuf>) {
    if !visited.insert(file.to_path_buf()) {
        return;
    }
    let Ok(contents) = fs::read_to_string(file) else {
        return;
    };
    let base = file.parent().map(Path::to_path_buf).unwrap_or_default();
    for line in contents.lines() {
        let Some(target) = include_target(line) else {
            continue;
        };
        let candidate = normalize_lexically(&base.join(target));
        if !candidate.is_file() {
            tracing::trace!(include = %target, from = %file.display(), "include not found on disk");
            continue;
        }
        if !found.contains(&candidate) {
            found.push(candidate.clone());
        }
        visit(&candidate, visited, found);
    }
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("include")?.trim_start();
    let (open, close) = match rest.chars().next()? {
        '"' => ('"', '"'),
        '<' => ('<', '>'),
        _ => return None,
    };
    let inner = rest.strip_prefix(open)?;
    let end = inner.find(close)?;
    let target = inner[..end].trim();
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_make_rule_with_continuations() {
        let depfile = "main.o: /src/main.hlsl \\\n  /src/lib/noise.h /src/with\\ space.h\n";
        let deps = parse_depfile(depfile);
        assert_eq!(
            deps,
            vec![
                PathBuf::from("/src/main.hlsl"),
                PathBuf::from("/src/lib/noise.h"),
                PathBuf::from("/src/with space.h"),
            ]
        );
    }

    #[test]
    fn dependency_set_keeps_first_seen_order() {
        let mut set = FileDependencySet::new();
        assert!(set.insert(Path::new("/a/shader.hlsl")));
        assert!(set.insert(Path::new("/a/inc/../common.h")));
        assert!(!set.insert(Path::new("/a/common.h")));
        assert_eq!(
            set.as_slice(),
            &[PathBuf::from("/a/shader.hlsl"), PathBuf::from("/a/common.h")]
        );
    }

    #[test]
    fn scan_follows_nested_includes_and_survives_cycles() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(
            dir.path().join("main.hlsl"),
            "#include \"lib/a.h\"\n#include \"missing.h\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("lib/a.h"), "# include <b.h>\n").unwrap();
        fs::write(dir.path().join("lib/b.h"), "#include \"a.h\"\n").unwrap();

        let found = scan_includes(&dir.path().join("main.hlsl"));
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("lib/a.h"));
        assert!(found[1].ends_with("lib/b.h"));
    }
}
