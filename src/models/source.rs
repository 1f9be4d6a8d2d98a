//! Per-document source definitions.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Which adapter turns the source response into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// ArcGIS feature layer query returning `features[*].attributes`
    Arcgis,
    /// JSON (or JSONP) feed
    Json,
    /// HTML table, one record per body row
    HtmlTable,
    /// Whole HTML fragment stored as a line list
    HtmlPage,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Arcgis => "arcgis",
            SourceKind::Json => "json",
            SourceKind::HtmlTable => "html_table",
            SourceKind::HtmlPage => "html_page",
        }
    }
}

/// HTTP method used to fetch the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    #[default]
    Get,
    Post,
}

/// Configuration for one source and the document it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Store path of the document, e.g. `fema-open-shelters.json`
    pub path: String,

    pub kind: SourceKind,

    /// URL the adapter fetches
    pub url: String,

    #[serde(default)]
    pub method: FetchMethod,

    /// Human-facing page the data was detected on
    #[serde(default)]
    pub source_url: Option<String>,

    #[serde(default = "defaults::noun")]
    pub noun: String,

    /// Overrides `noun + "s"`
    #[serde(default)]
    pub noun_plural: Option<String>,

    /// Identity field aliases in priority order. Empty means the document is
    /// not diffed record by record.
    #[serde(default)]
    pub identity: Vec<String>,

    /// Include the changed-records block in message bodies
    #[serde(default)]
    pub show_changes: bool,

    /// Display template for one record
    #[serde(default)]
    pub display: Option<String>,

    /// Display template for a changed pair, rendered against the new record
    #[serde(default)]
    pub display_pair: Option<String>,

    /// Sort keys applied after fetching, compared in order. Each key may list
    /// alias alternatives separated by `|`.
    #[serde(default)]
    pub sort_by: Vec<String>,

    /// JSON pointer to the record list inside the response (json kind)
    #[serde(default)]
    pub records_pointer: Option<String>,

    /// Unwrap `callback(...)` / `define(...)` around the JSON body
    #[serde(default)]
    pub strip_jsonp: bool,

    /// CSS selector for the table or page fragment (html kinds)
    #[serde(default)]
    pub selector: Option<String>,

    /// Send notifications for this document
    #[serde(default = "defaults::enabled")]
    pub notify: bool,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

impl SourceSpec {
    /// Minimal spec; remaining fields take their defaults.
    pub fn new(path: impl Into<String>, kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            url: url.into(),
            method: FetchMethod::Get,
            source_url: None,
            noun: defaults::noun(),
            noun_plural: None,
            identity: Vec::new(),
            show_changes: false,
            display: None,
            display_pair: None,
            sort_by: Vec::new(),
            records_pointer: None,
            strip_jsonp: false,
            selector: None,
            notify: true,
            enabled: true,
        }
    }

    /// Document name used in messages: the path without its `.json` suffix.
    pub fn display_name(&self) -> &str {
        self.path.strip_suffix(".json").unwrap_or(&self.path)
    }

    pub fn noun_plural(&self) -> String {
        self.noun_plural
            .clone()
            .unwrap_or_else(|| format!("{}s", self.noun))
    }

    /// Whether snapshots of this document are diffed record by record.
    pub fn is_delta(&self) -> bool {
        !self.identity.is_empty()
    }

    /// Sort keys as alias lists; without `sort_by`, records sort by identity.
    pub fn sort_keys(&self) -> Vec<Vec<String>> {
        if self.sort_by.is_empty() {
            if self.identity.is_empty() {
                return Vec::new();
            }
            return vec![self.identity.clone()];
        }
        self.sort_by
            .iter()
            .map(|key| key.split('|').map(|a| a.trim().to_string()).collect())
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(AppError::validation("source path is empty"));
        }
        if self.url.trim().is_empty() {
            return Err(AppError::validation(format!("{}: url is empty", self.path)));
        }
        url::Url::parse(&self.url)?;
        if self.noun.trim().is_empty() {
            return Err(AppError::validation(format!("{}: noun is empty", self.path)));
        }
        if self.kind == SourceKind::HtmlPage && self.is_delta() {
            return Err(AppError::validation(format!(
                "{}: html_page documents cannot declare identity fields",
                self.path
            )));
        }
        if let Some(pointer) = &self.records_pointer {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(AppError::validation(format!(
                    "{}: records_pointer must start with '/'",
                    self.path
                )));
            }
        }
        Ok(())
    }
}

mod defaults {
    pub fn noun() -> String {
        "record".into()
    }
    pub fn enabled() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_strips_json() {
        let spec = SourceSpec::new("fema-nss.json", SourceKind::Arcgis, "https://example.com");
        assert_eq!(spec.display_name(), "fema-nss");

        let spec = SourceSpec::new("raw", SourceKind::Json, "https://example.com");
        assert_eq!(spec.display_name(), "raw");
    }

    #[test]
    fn test_noun_plural_override() {
        let mut spec = SourceSpec::new("a.json", SourceKind::Json, "https://example.com");
        spec.noun = "shelter".into();
        assert_eq!(spec.noun_plural(), "shelters");

        spec.noun = "county".into();
        spec.noun_plural = Some("counties".into());
        assert_eq!(spec.noun_plural(), "counties");
    }

    #[test]
    fn test_deserialize_defaults() {
        let spec: SourceSpec = toml::from_str(
            r#"
            path = "scemd-shelters.json"
            kind = "html_table"
            url = "http://scemd.org/ShelterStatus.html"
            identity = ["Shelter Name"]
            "#,
        )
        .unwrap();

        assert_eq!(spec.kind, SourceKind::HtmlTable);
        assert_eq!(spec.method, FetchMethod::Get);
        assert_eq!(spec.noun, "record");
        assert!(spec.notify && spec.enabled);
        assert!(spec.is_delta());
        assert_eq!(spec.sort_keys(), vec![vec!["Shelter Name".to_string()]]);
    }

    #[test]
    fn test_sort_keys_split_aliases() {
        let mut spec = SourceSpec::new("a.json", SourceKind::Json, "https://example.com");
        assert!(spec.sort_keys().is_empty());

        spec.sort_by = vec!["county".into(), "name | NAME".into()];
        assert_eq!(
            spec.sort_keys(),
            vec![
                vec!["county".to_string()],
                vec!["name".to_string(), "NAME".to_string()]
            ]
        );
    }

    #[test]
    fn test_validate_rejects_bad_specs() {
        let spec = SourceSpec::new("a.json", SourceKind::Json, "not a url");
        assert!(spec.validate().is_err());

        let mut spec = SourceSpec::new("a.json", SourceKind::HtmlPage, "https://example.com");
        spec.identity = vec!["id".into()];
        assert!(spec.validate().is_err());

        let mut spec = SourceSpec::new("a.json", SourceKind::Json, "https://example.com");
        spec.records_pointer = Some("shelters".into());
        assert!(spec.validate().is_err());
    }
}
