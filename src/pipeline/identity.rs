//! Record identity resolution.
//!
//! Sources name the same property differently (`OBJECTID` vs `ObjectID`), so
//! identity is resolved from an ordered list of aliases, or from a custom
//! function when a single field is not enough.

use std::fmt;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Record, field};

/// Stable identity of a record within one document.
///
/// Holds the canonical JSON of the identity value, so `1` and `"1"` stay
/// distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn from_value(value: &Value) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Custom identity extraction; `None` means the record is unidentifiable.
pub type IdentityFn = fn(&Record) -> Option<Value>;

/// Per-source identity policy.
#[derive(Debug, Clone)]
pub enum IdentityResolver {
    /// First present, non-null field among the aliases
    Fields(Vec<String>),
    Custom { name: String, extract: IdentityFn },
}

impl IdentityResolver {
    pub fn fields<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(aliases.into_iter().map(Into::into).collect())
    }

    pub fn custom(name: impl Into<String>, extract: IdentityFn) -> Self {
        Self::Custom {
            name: name.into(),
            extract,
        }
    }

    /// Resolve the identity of a record.
    ///
    /// A record without any candidate field is a data-shape error, never a
    /// silent `None`.
    pub fn resolve(&self, record: &Record) -> Result<IdentityKey> {
        let value = match self {
            Self::Fields(aliases) => field(record, aliases).cloned(),
            Self::Custom { extract, .. } => extract(record).filter(|v| !v.is_null()),
        };

        value
            .map(|v| IdentityKey::from_value(&v))
            .ok_or_else(|| AppError::MissingIdentity {
                candidates: self.describe(),
            })
    }

    /// Human-readable description of the candidates, for errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Fields(aliases) => aliases.join(", "),
            Self::Custom { name, .. } => format!("custom:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_alias_fallback() {
        let resolver = IdentityResolver::fields(["OBJECTID", "ObjectID"]);
        let a = resolver.resolve(&record(json!({"OBJECTID": 12}))).unwrap();
        let b = resolver.resolve(&record(json!({"ObjectID": 12}))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stable_across_other_field_changes() {
        let resolver = IdentityResolver::fields(["id"]);
        let a = resolver
            .resolve(&record(json!({"id": "A", "status": "open"})))
            .unwrap();
        let b = resolver
            .resolve(&record(json!({"id": "A", "status": "closed"})))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_type_distinguishes_keys() {
        let resolver = IdentityResolver::fields(["id"]);
        let num = resolver.resolve(&record(json!({"id": 1}))).unwrap();
        let text = resolver.resolve(&record(json!({"id": "1"}))).unwrap();
        assert_ne!(num, text);
    }

    #[test]
    fn test_missing_identity_is_an_error() {
        let resolver = IdentityResolver::fields(["OBJECTID", "ObjectID"]);
        let err = resolver
            .resolve(&record(json!({"name": "Shelter"})))
            .unwrap_err();
        assert!(matches!(err, AppError::MissingIdentity { .. }));

        let err = resolver
            .resolve(&record(json!({"OBJECTID": null})))
            .unwrap_err();
        assert!(err.to_string().contains("OBJECTID, ObjectID"));
    }

    #[test]
    fn test_custom_resolver() {
        fn name_and_county(r: &Record) -> Option<Value> {
            let name = r.get("name")?.as_str()?;
            let county = r.get("county")?.as_str()?;
            Some(Value::String(format!("{name}|{county}")))
        }

        let resolver = IdentityResolver::custom("name+county", name_and_county);
        let key = resolver
            .resolve(&record(json!({"name": "School", "county": "Lee"})))
            .unwrap();
        assert_eq!(key.as_str(), "\"School|Lee\"");

        let err = resolver.resolve(&record(json!({"name": "School"}))).unwrap_err();
        assert!(err.to_string().contains("custom:name+county"));
    }
}
