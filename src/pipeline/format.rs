//! Human-readable change messages.
//!
//! A message is a one-line summary plus a body of blocks:
//!
//! ```text
//! fema-open-shelters: 2 shelters added, 1 shelter removed
//!
//! 2 new shelters:
//! Lincoln High School (Lee County)
//! Fort Myers Rec Center (Lee County)
//!
//! 1 shelter removed:
//! Bonita Springs Library (Lee County)
//!
//! Detected on https://example.com/map
//! ```
//!
//! Counts, pluralization and block order are uniform across sources; only
//! the per-record rendering is pluggable.

use std::fmt;

use crate::models::Record;
use crate::pipeline::diff::ChangeSet;

/// Renders records for message bodies.
pub trait RecordDisplay {
    fn display_one(&self, record: &Record) -> String;

    /// Render a changed pair. Defaults to the new record.
    fn display_pair(&self, _old: &Record, new: &Record) -> String {
        self.display_one(new)
    }
}

/// Verb used when a change set is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Created,
    Updated,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Created => "Created",
            Verb::Updated => "Updated",
        }
    }
}

/// Singular and plural forms of a source's record noun.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Noun {
    singular: String,
    plural: String,
}

impl Noun {
    /// Plural defaults to `singular + "s"`.
    pub fn new(singular: impl Into<String>) -> Self {
        let singular = singular.into();
        let plural = format!("{singular}s");
        Self { singular, plural }
    }

    pub fn with_plural(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
        }
    }

    pub fn for_count(&self, count: usize) -> &str {
        if count == 1 {
            &self.singular
        } else {
            &self.plural
        }
    }
}

/// Summary line plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub summary: String,
    pub body: String,
}

impl Message {
    /// Message with no body, e.g. `Updated santa-rosa-emergency`.
    pub fn generic(verb: Verb, document: &str) -> Self {
        Self {
            summary: format!("{} {}", verb.as_str(), document),
            body: String::new(),
        }
    }

    /// `summary + "\n\n" + body`, used as the commit message.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.summary, self.body)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Per-source message policy.
#[derive(Debug, Clone)]
pub struct MessageFormatter<'a> {
    document: &'a str,
    noun: Noun,
    show_changes: bool,
    source_url: Option<&'a str>,
}

impl<'a> MessageFormatter<'a> {
    pub fn new(document: &'a str, noun: Noun) -> Self {
        Self {
            document,
            noun,
            show_changes: false,
            source_url: None,
        }
    }

    /// Include the changed block in the body.
    pub fn show_changes(mut self, show: bool) -> Self {
        self.show_changes = show;
        self
    }

    /// Append `Detected on <url>` to non-empty bodies.
    pub fn source_url(mut self, url: Option<&'a str>) -> Self {
        self.source_url = url;
        self
    }

    /// Format a change set.
    ///
    /// An empty change set yields `"<verb> <document>"` with an empty body.
    pub fn format<D>(&self, changes: &ChangeSet, verb: Verb, display: &D) -> Message
    where
        D: RecordDisplay + ?Sized,
    {
        if changes.is_empty() {
            return Message::generic(verb, self.document);
        }

        let added = changes.added.len();
        let removed = changes.removed.len();
        let changed = changes.changed.len();

        let mut blocks = Vec::new();
        if added > 0 {
            let mut lines = vec![format!("{} new {}:", added, self.noun.for_count(added))];
            lines.extend(changes.added.iter().map(|r| display.display_one(r)));
            blocks.push(lines);
        }
        if removed > 0 {
            let mut lines = vec![format!("{} {} removed:", removed, self.noun.for_count(removed))];
            lines.extend(changes.removed.iter().map(|r| display.display_one(r)));
            blocks.push(lines);
        }
        if self.show_changes && changed > 0 {
            let mut lines = vec![format!("{} {} changed:", changed, self.noun.for_count(changed))];
            lines.extend(
                changes
                    .changed
                    .iter()
                    .map(|(old, new)| display.display_pair(old, new)),
            );
            blocks.push(lines);
        }

        let mut parts: Vec<String> = blocks
            .iter()
            .map(|lines| trim_blank_lines(&lines.join("\n")).to_string())
            .collect();
        if let Some(url) = self.source_url {
            parts.push(format!("Detected on {url}"));
        }

        let mut clauses = Vec::new();
        if added > 0 {
            clauses.push(format!("{} {} added", added, self.noun.for_count(added)));
        }
        if removed > 0 {
            clauses.push(format!("{} {} removed", removed, self.noun.for_count(removed)));
        }
        if changed > 0 {
            clauses.push(format!("{} {} changed", changed, self.noun.for_count(changed)));
        }

        Message {
            summary: format!("{}: {}", self.document, clauses.join(", ")),
            body: parts.join("\n\n"),
        }
    }
}

/// Drop whitespace-only lines at both ends; indentation of the remaining
/// first and last lines is kept.
fn trim_blank_lines(text: &str) -> &str {
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    let rest = &text[start..];

    let mut end = rest.len();
    while let Some(pos) = rest[..end].rfind('\n') {
        if rest[pos + 1..end].trim().is_empty() {
            end = pos;
        } else {
            break;
        }
    }
    if rest[..end].trim().is_empty() {
        return "";
    }
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    struct ByName;

    impl RecordDisplay for ByName {
        fn display_one(&self, record: &Record) -> String {
            record["name"].as_str().unwrap_or_default().to_string()
        }

        fn display_pair(&self, old: &Record, new: &Record) -> String {
            format!("{} -> {}", old["name"], new["name"])
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn shelters() -> MessageFormatter<'static> {
        MessageFormatter::new("fema-open-shelters", Noun::new("shelter"))
    }

    #[test]
    fn test_empty_change_set_uses_verb() {
        let changes = ChangeSet::default();

        let created = shelters().format(&changes, Verb::Created, &ByName);
        assert_eq!(created.summary, "Created fema-open-shelters");
        assert_eq!(created.body, "");
        assert_eq!(created.render(), "Created fema-open-shelters\n\n");

        let updated = shelters().format(&changes, Verb::Updated, &ByName);
        assert_eq!(updated.summary, "Updated fema-open-shelters");
    }

    #[test]
    fn test_single_addition_is_singular() {
        let changes = ChangeSet {
            added: vec![record(json!({"name": "Shelter B"}))],
            ..ChangeSet::default()
        };

        let message = shelters().format(&changes, Verb::Updated, &ByName);
        assert_eq!(message.summary, "fema-open-shelters: 1 shelter added");
        assert_eq!(message.body, "1 new shelter:\nShelter B");
    }

    #[test]
    fn test_plural_and_clause_order() {
        let changes = ChangeSet {
            added: vec![record(json!({"name": "A"})), record(json!({"name": "B"}))],
            removed: vec![record(json!({"name": "C"}))],
            changed: vec![(record(json!({"name": "D"})), record(json!({"name": "E"})))],
        };

        let message = shelters().format(&changes, Verb::Updated, &ByName);
        assert_eq!(
            message.summary,
            "fema-open-shelters: 2 shelters added, 1 shelter removed, 1 shelter changed"
        );
        // Changed block is suppressed unless the source opts in
        assert_eq!(message.body, "2 new shelters:\nA\nB\n\n1 shelter removed:\nC");
    }

    #[test]
    fn test_show_changes_block() {
        let changes = ChangeSet {
            changed: vec![
                (record(json!({"name": "D"})), record(json!({"name": "E"}))),
                (record(json!({"name": "F"})), record(json!({"name": "G"}))),
            ],
            ..ChangeSet::default()
        };

        let message = shelters()
            .show_changes(true)
            .format(&changes, Verb::Updated, &ByName);
        assert_eq!(message.summary, "fema-open-shelters: 2 shelters changed");
        assert_eq!(
            message.body,
            "2 shelters changed:\n\"D\" -> \"E\"\n\"F\" -> \"G\""
        );
    }

    #[test]
    fn test_plural_override() {
        let changes = ChangeSet {
            removed: vec![record(json!({"name": "X"})), record(json!({"name": "Y"}))],
            ..ChangeSet::default()
        };

        let message = MessageFormatter::new("outages", Noun::with_plural("county", "counties"))
            .format(&changes, Verb::Updated, &ByName);
        assert_eq!(message.summary, "outages: 2 counties removed");
        assert!(message.body.starts_with("2 counties removed:"));
    }

    #[test]
    fn test_source_url_trailer() {
        let changes = ChangeSet {
            added: vec![record(json!({"name": "A"}))],
            ..ChangeSet::default()
        };

        let message = shelters()
            .source_url(Some("https://example.com/map"))
            .format(&changes, Verb::Updated, &ByName);
        assert_eq!(
            message.render(),
            "fema-open-shelters: 1 shelter added\n\n1 new shelter:\nA\n\nDetected on https://example.com/map"
        );
    }

    #[test]
    fn test_blocks_trim_blank_lines() {
        struct Padded;
        impl RecordDisplay for Padded {
            fn display_one(&self, record: &Record) -> String {
                format!("  {}\n    Accessible: Y\n", record["name"].as_str().unwrap())
            }
        }

        let changes = ChangeSet {
            added: vec![record(json!({"name": "A"}))],
            removed: vec![record(json!({"name": "B"}))],
            ..ChangeSet::default()
        };

        let message = shelters().format(&changes, Verb::Updated, &Padded);
        assert_eq!(
            message.body,
            "1 new shelter:\n  A\n    Accessible: Y\n\n1 shelter removed:\n  B\n    Accessible: Y"
        );
    }

    #[test]
    fn test_trim_blank_lines() {
        assert_eq!(trim_blank_lines("\n \nabc\n  def\n\n  \n"), "abc\n  def");
        assert_eq!(trim_blank_lines("  keep indent"), "  keep indent");
        assert_eq!(trim_blank_lines("\n\n"), "");
    }
}
