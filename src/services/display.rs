//! Record display templates.
//!
//! A template is literal text with `{FIELD|ALIAS|...}` placeholders. The
//! first alias present on the record with a non-null value is used; a
//! placeholder with no match renders empty. An optional filter follows a
//! colon: `{COUNTY_PARISH|county:title}`. `{{` and `}}` are literal braces.

use std::str::FromStr;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Record, SourceKind, SourceSpec, field, field_text, value_text};
use crate::services::arcgis;
use crate::utils::title_case;

/// Aliases tried when a source has no display template.
const NAME_ALIASES: &[&str] = &["name", "Name", "NAME", "label", "title", "SHELTER_NAME"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Title,
    Upper,
    Lower,
    Trim,
}

impl Filter {
    fn apply(self, text: String) -> String {
        match self {
            Filter::Title => title_case(&text),
            Filter::Upper => text.to_uppercase(),
            Filter::Lower => text.to_lowercase(),
            Filter::Trim => text.trim().to_string(),
        }
    }
}

impl FromStr for Filter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "title" => Ok(Filter::Title),
            "upper" => Ok(Filter::Upper),
            "lower" => Ok(Filter::Lower),
            "trim" => Ok(Filter::Trim),
            other => Err(AppError::validation(format!("unknown display filter: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field {
        aliases: Vec<String>,
        filter: Option<Filter>,
    },
}

/// Parsed display template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(AppError::validation(format!(
                            "unclosed placeholder in display template: {text}"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_placeholder(&inner, text)?);
                }
                '}' => {
                    return Err(AppError::validation(format!(
                        "unmatched '}}' in display template: {text}"
                    )));
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, record: &Record) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { aliases, filter } => {
                    let text = field_text(record, aliases).unwrap_or_default();
                    match filter {
                        Some(filter) => out.push_str(&filter.apply(text)),
                        None => out.push_str(&text),
                    }
                }
            }
        }
        out
    }
}

impl FromStr for Template {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_placeholder(inner: &str, template: &str) -> Result<Segment> {
    let (names, filter) = match inner.rsplit_once(':') {
        Some((names, filter)) => (names, Some(filter.parse::<Filter>()?)),
        None => (inner, None),
    };

    let aliases: Vec<String> = names
        .split('|')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    if aliases.is_empty() {
        return Err(AppError::validation(format!(
            "empty placeholder in display template: {template}"
        )));
    }

    Ok(Segment::Field { aliases, filter })
}

/// How a source renders one record.
#[derive(Debug, Clone)]
pub enum Renderer {
    Template(Template),
    /// `Name (X County)` / `Name (City, ST)` rendering of GIS shelter layers
    GisShelter,
    /// Name-like field, else the identity value, else compact JSON
    Fallback { identity: Vec<String> },
}

impl Renderer {
    pub fn for_spec(spec: &SourceSpec) -> Result<Self> {
        if let Some(template) = &spec.display {
            return Ok(Self::Template(Template::parse(template)?));
        }
        if spec.kind == SourceKind::Arcgis {
            return Ok(Self::GisShelter);
        }
        Ok(Self::Fallback {
            identity: spec.identity.clone(),
        })
    }

    pub fn render(&self, record: &Record) -> String {
        match self {
            Self::Template(template) => template.render(record),
            Self::GisShelter => arcgis::shelter_display(record),
            Self::Fallback { identity } => field_text(record, NAME_ALIASES)
                .or_else(|| field_text(record, identity))
                .unwrap_or_else(|| Value::Object(record.clone()).to_string()),
        }
    }
}

/// One indented `field: old -> new` line per differing field of the new
/// record, followed by fields that disappeared.
pub fn changed_fields(old: &Record, new: &Record) -> Vec<String> {
    let render = |value: Option<&Value>| value.map(value_text).unwrap_or_default();

    let mut lines = Vec::new();
    for (key, value) in new {
        let before = old.get(key);
        if before != Some(value) {
            lines.push(format!("  {}: {} -> {}", key, render(before), value_text(value)));
        }
    }
    for (key, value) in old {
        if !new.contains_key(key) {
            lines.push(format!("  {}: {} -> ", key, value_text(value)));
        }
    }
    lines
}

/// Head line rendered against the new record, then the field changes.
pub fn render_pair(head: &str, old: &Record, new: &Record) -> String {
    let mut lines = vec![head.to_string()];
    lines.extend(changed_fields(old, new));
    lines.join("\n")
}

/// Whether a record has any of the aliases set, null or not.
pub fn has_any(record: &Record, aliases: &[&str]) -> bool {
    aliases.iter().any(|a| record.contains_key(*a))
}

/// Convenience for templates that only need the first present alias.
pub fn first_text(record: &Record, aliases: &[&str]) -> String {
    field(record, aliases).map(value_text).unwrap_or_default()
}
