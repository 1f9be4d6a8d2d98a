//! ArcGIS feature layer queries.
//!
//! A layer query answers `{"features": [{"attributes": {...}}, ...]}`; the
//! attributes objects are the records. ArcGIS reports query failures as an
//! `error` object inside a 200 response.

use reqwest::Client;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Record, SourceSpec};
use crate::services::display::{first_text, has_any};
use crate::utils::{http, title_case};

const NAME: &[&str] = &["SHELTER_NAME", "label"];
const COUNTY: &[&str] = &["COUNTY_PARISH", "county"];

pub async fn fetch(client: &Client, spec: &SourceSpec) -> Result<Value> {
    let text = http::fetch_text(client, spec.method, &spec.url).await?;
    let body: Value = serde_json::from_str(&text)?;
    features_to_records(&body, &spec.path)
}

/// Pull `features[*].attributes` out of a query response.
pub fn features_to_records(body: &Value, context: &str) -> Result<Value> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(AppError::fetch(context, format!("ArcGIS error: {message}")));
    }

    let features = body
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::fetch(context, "response has no features list"))?;

    let records = features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            feature
                .get("attributes")
                .filter(|a| a.is_object())
                .cloned()
                .ok_or_else(|| AppError::fetch(context, format!("feature {i} has no attributes")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Value::Array(records))
}

/// `Name (Lee County)` when a county is known, `Name (Tampa, FL)` when a
/// city and state are, else just the name.
pub fn shelter_display(record: &Record) -> String {
    let name = first_text(record, NAME);
    let text = if has_any(record, COUNTY) {
        format!("{} ({} County)", name, title_case(&first_text(record, COUNTY)))
    } else if record.contains_key("CITY") && record.contains_key("STATE") {
        format!(
            "{} ({}, {})",
            name,
            title_case(&first_text(record, &["CITY"])),
            first_text(record, &["STATE"])
        )
    } else {
        name
    };
    text.replace("County County", "County")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_features_to_records() {
        let body = json!({
            "features": [
                {"attributes": {"OBJECTID": 2, "SHELTER_NAME": "B"}},
                {"attributes": {"OBJECTID": 1, "SHELTER_NAME": "A"}, "geometry": {"x": 1}}
            ]
        });
        let records = features_to_records(&body, "fema-nss.json").unwrap();
        assert_eq!(
            records,
            json!([
                {"OBJECTID": 2, "SHELTER_NAME": "B"},
                {"OBJECTID": 1, "SHELTER_NAME": "A"}
            ])
        );
    }

    #[test]
    fn test_error_object_is_fetch_error() {
        let body = json!({"error": {"code": 400, "message": "Invalid query parameters"}});
        let err = features_to_records(&body, "fema-nss.json").unwrap_err();
        assert!(matches!(err, AppError::Fetch { .. }));
        assert!(err.to_string().contains("Invalid query parameters"));
    }

    #[test]
    fn test_missing_features_is_fetch_error() {
        assert!(features_to_records(&json!({"fields": []}), "x").is_err());
        assert!(features_to_records(&json!({"features": [{"geometry": {}}]}), "x").is_err());
        assert_eq!(
            features_to_records(&json!({"features": []}), "x").unwrap(),
            json!([])
        );
    }

    #[test]
    fn test_shelter_display_county() {
        let r = record(json!({"SHELTER_NAME": "Lincoln High", "COUNTY_PARISH": "LEE"}));
        assert_eq!(shelter_display(&r), "Lincoln High (Lee County)");

        let r = record(json!({"label": "Rec Center", "county": "Fulton County"}));
        assert_eq!(shelter_display(&r), "Rec Center (Fulton County)");
    }

    #[test]
    fn test_shelter_display_city_state() {
        let r = record(json!({"SHELTER_NAME": "Armory", "CITY": "TAMPA", "STATE": "FL"}));
        assert_eq!(shelter_display(&r), "Armory (Tampa, FL)");
    }

    #[test]
    fn test_shelter_display_name_only() {
        let r = record(json!({"label": "Gym"}));
        assert_eq!(shelter_display(&r), "Gym");
    }
}
