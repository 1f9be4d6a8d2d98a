//! JSON and JSONP feeds.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::SourceSpec;
use crate::utils::http;

/// `callback(...)` or `define(...)` wrapped around a JSON body.
static JSONP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*[A-Za-z_$][\w$.]*\s*\((.*)\)\s*;?\s*$").ok());

pub async fn fetch(client: &Client, spec: &SourceSpec) -> Result<Value> {
    let text = http::fetch_text(client, spec.method, &spec.url).await?;
    parse(&text, spec)
}

/// Parse a feed body according to the source options.
pub fn parse(text: &str, spec: &SourceSpec) -> Result<Value> {
    let body = if spec.strip_jsonp {
        unwrap_jsonp(text)
    } else {
        text.trim()
    };
    let value: Value = serde_json::from_str(body)?;

    match spec.records_pointer.as_deref() {
        None | Some("") => Ok(value),
        Some(pointer) => value.pointer(pointer).cloned().ok_or_else(|| {
            AppError::fetch(&spec.path, format!("nothing at {pointer} in response"))
        }),
    }
}

/// Strip a JSONP wrapper, leaving plain JSON untouched.
pub fn unwrap_jsonp(text: &str) -> &str {
    JSONP
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map_or(text.trim(), |m| m.as_str().trim())
}
