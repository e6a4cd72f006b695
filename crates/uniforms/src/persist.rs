//! Text format for saved uniform values.
//!
//! One variable per line: `name, v0[, v1, v2, v3]`. Blank lines and lines
//! starting with `#` are skipped. Values are written with Rust's shortest
//! round-trip float formatting, so a save/load cycle is exact.
use std::fmt::Write as _;

use crate::error::PersistFileParseError;
use crate::variable::UniformVariable;

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntry {
    pub name: String,
    pub values: Vec<f32>,
}

/// Outcome of a best-effort load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Variables whose value was taken from the file.
    pub applied: usize,
    /// Names present in the file but not declared by the current shader.
    pub unknown: Vec<String>,
    /// Lines that were skipped.
    pub errors: Vec<PersistFileParseError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn format_persisted(variables: &[UniformVariable]) -> String {
    let mut out = String::new();
    for variable in variables {
        out.push_str(&variable.name);
        for value in variable.values() {
            let _ = write!(out, ", {value}");
        }
        out.push('\n');
    }
    out
}

/// Parses every line, collecting good entries and per-line errors separately.
pub fn parse_persisted(contents: &str) -> (Vec<PersistedEntry>, Vec<PersistFileParseError>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed) {
            Ok(entry) => entries.push(entry),
            Err(reason) => errors.push(PersistFileParseError {
                line: index + 1,
                reason,
            }),
        }
    }
    (entries, errors)
}

fn parse_line(line: &str) -> Result<PersistedEntry, String> {
    let mut fields = line.split(',').map(str::trim);
    let name = fields.next().unwrap_or_default();
    if name.is_empty() {
        return Err("missing uniform name".to_string());
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(format!("invalid uniform name `{name}`"));
    }
    let values = fields
        .map(|field| {
            field
                .parse::<f32>()
                .map_err(|_| format!("`{field}` is not a number"))
        })
        .collect::<Result<Vec<f32>, String>>()?;
    if values.is_empty() || values.len() > 4 {
        return Err(format!(
            "expected 1 to 4 values for `{name}`, found {}",
            values.len()
        ));
    }
    Ok(PersistedEntry {
        name: name.to_string(),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderschema::{ComponentType, UniformRange, UniformStyle};

    #[test]
    fn formats_one_line_per_variable() {
        let mut pos = UniformVariable::new(
            "pos",
            ComponentType::Vec2,
            UniformStyle::Slider,
            UniformRange::new(-1.0, 1.0),
        );
        pos.assign(&[0.25, -0.5]);
        let mut on = UniformVariable::new(
            "on",
            ComponentType::Scalar,
            UniformStyle::Toggle,
            UniformRange::default(),
        );
        on.assign(&[1.0]);
        assert_eq!(format_persisted(&[pos, on]), "pos, 0.25, -0.5\non, 1\n");
    }

    #[test]
    fn parse_keeps_good_lines_and_reports_bad_ones() {
        let contents = "# saved\npos, 0.25, -0.5\n\nbad line\nspeed, fast\nwide, 1, 2, 3, 4, 5\n, 1\ngain, 0.1\n";
        let (entries, errors) = parse_persisted(contents);
        assert_eq!(
            entries,
            vec![
                PersistedEntry {
                    name: "pos".into(),
                    values: vec![0.25, -0.5]
                },
                PersistedEntry {
                    name: "gain".into(),
                    values: vec![0.1]
                },
            ]
        );
        let lines: Vec<usize> = errors.iter().map(|err| err.line).collect();
        assert_eq!(lines, vec![4, 5, 6, 7]);
    }
}
