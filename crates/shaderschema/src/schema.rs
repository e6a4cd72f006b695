//! Uniform schema extraction from annotated shader structs.
//!
//! The grammar is line oriented:
//!
//! ```text
//! struct Params { // @uniform
//!     float  gain;     // @range 0 .. 4
//!     float  enabled;  // @toggle
//!     float2 offset;   // @range -1 .. 1
//! };
//! ```
//!
//! Only the first tagged struct defines the schema. Problems with a single
//! field are logged and that field is skipped; only an unterminated struct
//! rejects the whole schema.
use std::fmt;

use crate::error::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
}

impl ComponentType {
    pub fn component_count(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
        }
    }

    pub fn from_component_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(Self::Scalar),
            2 => Some(Self::Vec2),
            3 => Some(Self::Vec3),
            4 => Some(Self::Vec4),
            _ => None,
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "float" => Some(Self::Scalar),
            "float2" => Some(Self::Vec2),
            "float3" => Some(Self::Vec3),
            "float4" => Some(Self::Vec4),
            _ => None,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Scalar => "float",
            Self::Vec2 => "float2",
            Self::Vec3 => "float3",
            Self::Vec4 => "float4",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UniformStyle {
    #[default]
    Slider,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformRange {
    pub min: f32,
    pub max: f32,
}

impl UniformRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

impl Default for UniformRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// One field of the tagged uniform struct.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformDecl {
    pub name: String,
    pub component_type: ComponentType,
    pub style: UniformStyle,
    pub range: UniformRange,
    pub active: bool,
    /// 1-based line in the preprocessed source.
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSchema {
    pub struct_name: Option<String>,
    pub declarations: Vec<UniformDecl>,
}

impl UniformSchema {
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&UniformDecl> {
        self.declarations.iter().find(|decl| decl.name == name)
    }
}

pub fn extract_schema(source: &str) -> Result<UniformSchema, SchemaError> {
    let lines: Vec<&str> = source.lines().collect();
    let mut schema = UniformSchema::default();
    let mut block: Option<(usize, usize)> = None;

    for (index, line) in lines.iter().enumerate() {
        let Some(struct_name) = uniform_struct_name(line) else {
            continue;
        };
        if let Some((start, _)) = block {
            tracing::warn!(
                line = index + 1,
                first = start + 1,
                struct_name,
                "ignoring additional @uniform struct"
            );
            continue;
        }
        let end = lines[index + 1..]
            .iter()
            .position(|candidate| closes_struct(candidate))
            .map(|offset| index + 1 + offset)
            .ok_or_else(|| SchemaError::Unterminated(struct_name.to_string(), index + 1))?;

        for (field_index, field_line) in lines.iter().enumerate().take(end).skip(index + 1) {
            match parse_field(field_line, field_index + 1) {
                Ok(Some(decl)) => {
                    if schema.get(&decl.name).is_some() {
                        let err = SchemaError::Duplicate {
                            line: decl.line,
                            name: decl.name,
                        };
                        tracing::warn!(error = %err, "skipping uniform");
                        continue;
                    }
                    schema.declarations.push(decl);
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "skipping uniform"),
            }
        }
        schema.struct_name = Some(struct_name.to_string());
        block = Some((index, end));
    }

    if let Some((start, end)) = block {
        for (index, line) in lines.iter().enumerate() {
            if (start..=end).contains(&index) {
                continue;
            }
            for decl in schema.declarations.iter_mut().filter(|decl| !decl.active) {
                if contains_word(line, &decl.name) {
                    decl.active = true;
                }
            }
        }
    }

    Ok(schema)
}

fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.find("//") {
        Some(pos) => (&line[..pos], Some(&line[pos + 2..])),
        None => (line, None),
    }
}

fn uniform_struct_name(line: &str) -> Option<&str> {
    let (code, comment) = split_comment(line);
    if !comment?.trim_start().starts_with("@uniform") {
        return None;
    }
    let rest = code.trim().strip_prefix("struct")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let ident_len = rest
        .find(|ch: char| !is_ident_char(ch))
        .unwrap_or(rest.len());
    let (ident, tail) = rest.split_at(ident_len);
    if !is_identifier(ident) || tail.trim() != "{" {
        return None;
    }
    Some(ident)
}

fn closes_struct(line: &str) -> bool {
    split_comment(line).0.trim().starts_with("};")
}

fn parse_field(line: &str, line_no: usize) -> Result<Option<UniformDecl>, SchemaError> {
    let (code, comment) = split_comment(line);
    let code = code.trim().trim_end_matches(';').trim();
    if code.is_empty() {
        return Ok(None);
    }
    let mut tokens = code.split_whitespace();
    let (Some(type_name), Some(name), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        tracing::debug!(line = line_no, text = code, "not a uniform field");
        return Ok(None);
    };
    if !is_identifier(name) {
        tracing::debug!(line = line_no, text = code, "not a uniform field");
        return Ok(None);
    }
    let component_type =
        ComponentType::from_type_name(type_name).ok_or_else(|| SchemaError::UnknownType {
            line: line_no,
            type_name: type_name.to_string(),
            name: name.to_string(),
        })?;

    let mut decl = UniformDecl {
        name: name.to_string(),
        component_type,
        style: UniformStyle::Slider,
        range: UniformRange::default(),
        active: false,
        line: line_no,
    };

    let Some(comment) = comment else {
        return Ok(Some(decl));
    };
    if let Some(pos) = comment.find("@range") {
        decl.range = parse_range(&comment[pos + "@range".len()..]).map_err(|reason| {
            SchemaError::MalformedRange {
                line: line_no,
                name: name.to_string(),
                reason,
            }
        })?;
    }
    if comment.contains("@toggle") {
        if component_type == ComponentType::Scalar {
            decl.style = UniformStyle::Toggle;
        } else {
            tracing::warn!(
                line = line_no,
                name,
                %component_type,
                "@toggle only applies to scalar uniforms; keeping slider"
            );
        }
    }
    Ok(Some(decl))
}

fn parse_range(text: &str) -> Result<UniformRange, String> {
    let (low, high) = text
        .split_once("..")
        .ok_or_else(|| "expected '<min> .. <max>'".to_string())?;
    let low = low.trim();
    let high = high.split_whitespace().next().unwrap_or("");
    let min: f32 = low
        .parse()
        .map_err(|_| format!("invalid minimum '{low}'"))?;
    let max: f32 = high
        .parse()
        .map_err(|_| format!("invalid maximum '{high}'"))?;
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(format!("range {min} .. {max} is empty or not finite"));
    }
    Ok(UniformRange::new(min, max))
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => chars.all(is_ident_char),
        _ => false,
    }
}

fn contains_word(line: &str, word: &str) -> bool {
    let bytes = line.as_bytes();
    let mut from = 0;
    while let Some(pos) = line[from..].find(word) {
        let start = from + pos;
        let end = start + word.len();
        let before_ok = start == 0 || !is_ident_char(bytes[start - 1] as char);
        let after_ok = end == bytes.len() || !is_ident_char(bytes[end] as char);
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_annotated_vec2_and_marks_it_active() {
        let source = "struct S { // @uniform\n\
                      float2 pos; // @range -1 .. 1\n\
                      };\n\
                      float4 pass0(float2 uv) { return float4(params.pos, 0, 1); }\n";
        let schema = extract_schema(source).expect("schema");
        assert_eq!(schema.struct_name.as_deref(), Some("S"));
        assert_eq!(
            schema.declarations,
            vec![UniformDecl {
                name: "pos".into(),
                component_type: ComponentType::Vec2,
                style: UniformStyle::Slider,
                range: UniformRange::new(-1.0, 1.0),
                active: true,
                line: 2,
            }]
        );
    }

    #[test]
    fn keeps_declaration_order_and_defaults() {
        let source = "struct  Params{   //   @uniform\n\
                      float gain;\n\
                      float4 tint; // @range 0..2\n\
                      float3 dir;\n\
                      };\n";
        let schema = extract_schema(source).expect("schema");
        let names: Vec<_> = schema.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["gain", "tint", "dir"]);
        assert_eq!(schema.declarations[0].range, UniformRange::default());
        assert_eq!(schema.declarations[1].range, UniformRange::new(0.0, 2.0));
        assert!(schema.declarations.iter().all(|d| !d.active));
    }

    #[test]
    fn toggle_is_scalar_only() {
        let source = "struct P { // @uniform\n\
                      float on; // @toggle\n\
                      float2 both; // @toggle\n\
                      };\n";
        let schema = extract_schema(source).expect("schema");
        assert_eq!(schema.declarations[0].style, UniformStyle::Toggle);
        assert_eq!(schema.declarations[1].style, UniformStyle::Slider);
        assert_eq!(schema.declarations.len(), 2);
    }

    #[test]
    fn skips_unknown_types_and_bad_ranges_without_failing() {
        let source = "struct P { // @uniform\n\
                      int count;\n\
                      float bad; // @range 3 .. 1\n\
                      float good;\n\
                      float good;\n\
                      };\n";
        let schema = extract_schema(source).expect("schema");
        let names: Vec<_> = schema.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["good"]);
    }

    #[test]
    fn unterminated_struct_is_an_error() {
        let err = extract_schema("struct P { // @uniform\nfloat x;\n").unwrap_err();
        assert_eq!(err, SchemaError::Unterminated("P".into(), 1));
    }

    #[test]
    fn untagged_source_has_empty_schema() {
        let schema = extract_schema("struct P {\nfloat x;\n};\n").expect("schema");
        assert!(schema.is_empty());
        assert!(schema.struct_name.is_none());
    }

    #[test]
    fn activity_requires_whole_word_outside_struct() {
        let source = "float posx = 1.0;\n\
                      struct P { // @uniform\n\
                      float pos;\n\
                      float scale;\n\
                      };\n\
                      float y = p.scale*2.0;\n";
        let schema = extract_schema(source).expect("schema");
        assert!(!schema.get("pos").unwrap().active);
        assert!(schema.get("scale").unwrap().active);
    }

    #[test]
    fn word_matching_respects_identifier_boundaries() {
        assert!(contains_word("a.pos + 1", "pos"));
        assert!(!contains_word("position", "pos"));
        assert!(!contains_word("_pos", "pos"));
        assert!(contains_word("xpos pos", "pos"));
    }
}
