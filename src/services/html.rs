//! HTML adapters: tables to records, page fragments to line lists.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value, json};

use crate::error::{AppError, Result};
use crate::models::SourceSpec;
use crate::utils::{http, normalize_whitespace};

static SCRIPTS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").ok());
static COMMENTS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").ok());

pub async fn fetch_table(client: &Client, spec: &SourceSpec) -> Result<Value> {
    let text = http::fetch_text(client, spec.method, &spec.url).await?;
    parse_table(&text, spec.selector.as_deref().unwrap_or("table"), &spec.path)
}

/// Fetch a page fragment. A page without the fragment yields `None`.
pub async fn fetch_page(client: &Client, spec: &SourceSpec) -> Result<Option<Value>> {
    let text = http::fetch_text(client, spec.method, &spec.url).await?;
    parse_page(&text, spec.selector.as_deref().unwrap_or("body"))
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    normalize_whitespace(&cell.text().collect::<String>())
}

/// Turn the first table matching `selector` into records keyed by the
/// header cells. Rows without data cells are skipped.
pub fn parse_table(html: &str, selector: &str, context: &str) -> Result<Value> {
    let document = Html::parse_document(html);
    let table_sel = parse_selector(selector)?;
    let row_sel = parse_selector("tr")?;
    let header_sel = parse_selector("th")?;
    let data_sel = parse_selector("td")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| AppError::fetch(context, format!("no element matches '{selector}'")))?;

    let mut rows = table.select(&row_sel);
    let headings: Vec<String> = rows
        .by_ref()
        .map(|row| {
            let th: Vec<String> = row.select(&header_sel).map(cell_text).collect();
            if th.is_empty() {
                row.select(&data_sel).map(cell_text).collect()
            } else {
                th
            }
        })
        .find(|cells| !cells.is_empty())
        .ok_or_else(|| AppError::fetch(context, "table has no header row"))?;

    let records = rows
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&data_sel).map(cell_text).collect();
            if cells.is_empty() {
                return None;
            }
            let record: Map<String, Value> = headings
                .iter()
                .cloned()
                .zip(cells.into_iter().map(Value::String))
                .collect();
            Some(Value::Object(record))
        })
        .collect();

    Ok(Value::Array(records))
}

/// Store the fragment matching `selector` as `{"html_lines": [...]}`, with
/// scripts and comments removed.
pub fn parse_page(html: &str, selector: &str) -> Result<Option<Value>> {
    let document = Html::parse_document(html);
    let sel = parse_selector(selector)?;
    let Some(element) = document.select(&sel).next() else {
        return Ok(None);
    };

    let mut fragment = element.html();
    for pattern in [&*SCRIPTS, &*COMMENTS].into_iter().flatten() {
        fragment = pattern.replace_all(&fragment, "").into_owned();
    }

    let lines: Vec<&str> = fragment.split('\n').collect();
    Ok(Some(json!({ "html_lines": lines })))
}
