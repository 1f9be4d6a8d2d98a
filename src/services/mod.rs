//! Source adapters.
//!
//! A [`Source`] owns one document: it knows how to fetch a fresh snapshot,
//! how to identify records and how to render them in change messages.
//! [`ConfiguredSource`] builds all of that from a [`SourceSpec`]:
//!
//! - `arcgis`: ArcGIS feature layer queries (`arcgis`)
//! - `json`: JSON and JSONP feeds (`json_feed`)
//! - `html_table` / `html_page`: scraped HTML (`html`)

pub mod arcgis;
pub mod display;
pub mod html;
pub mod json_feed;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::Result;
use crate::models::{Config, Record, SourceKind, SourceSpec, field};
use crate::pipeline::format::{Noun, RecordDisplay};
use crate::pipeline::identity::IdentityResolver;

pub use display::{Renderer, Template};

/// One data source and the document it owns.
#[async_trait]
pub trait Source: RecordDisplay + Send + Sync {
    fn spec(&self) -> &SourceSpec;

    /// Fetch the current snapshot. `None` means "no data this time".
    async fn fetch(&self, client: &Client) -> Result<Option<Value>>;

    /// Identity policy for record-list documents; `None` for documents that
    /// are stored whole.
    fn identity(&self) -> Option<&IdentityResolver>;

    fn noun(&self) -> Noun {
        let spec = self.spec();
        Noun::with_plural(spec.noun.clone(), spec.noun_plural())
    }
}

/// Source driven entirely by configuration.
#[derive(Debug, Clone)]
pub struct ConfiguredSource {
    spec: SourceSpec,
    identity: Option<IdentityResolver>,
    one: Renderer,
    pair: Option<Template>,
}

impl ConfiguredSource {
    pub fn new(spec: SourceSpec) -> Result<Self> {
        spec.validate()?;
        let identity = spec
            .is_delta()
            .then(|| IdentityResolver::fields(spec.identity.iter().cloned()));
        let one = Renderer::for_spec(&spec)?;
        let pair = spec.display_pair.as_deref().map(Template::parse).transpose()?;

        Ok(Self {
            spec,
            identity,
            one,
            pair,
        })
    }
}

impl RecordDisplay for ConfiguredSource {
    fn display_one(&self, record: &Record) -> String {
        self.one.render(record)
    }

    fn display_pair(&self, old: &Record, new: &Record) -> String {
        let head = match &self.pair {
            Some(template) => template.render(new),
            None => self.one.render(new),
        };
        display::render_pair(&head, old, new)
    }
}

#[async_trait]
impl Source for ConfiguredSource {
    fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    async fn fetch(&self, client: &Client) -> Result<Option<Value>> {
        let mut data = match self.spec.kind {
            SourceKind::Arcgis => arcgis::fetch(client, &self.spec).await?,
            SourceKind::Json => json_feed::fetch(client, &self.spec).await?,
            SourceKind::HtmlTable => html::fetch_table(client, &self.spec).await?,
            SourceKind::HtmlPage => match html::fetch_page(client, &self.spec).await? {
                Some(page) => page,
                None => return Ok(None),
            },
        };

        if let Value::Array(items) = &mut data {
            sort_records(items, &self.spec.sort_keys());
        }
        Ok(Some(data))
    }

    fn identity(&self) -> Option<&IdentityResolver> {
        self.identity.as_ref()
    }
}

/// Build the enabled sources of a configuration.
pub fn build_sources(config: &Config) -> Result<Vec<Arc<dyn Source>>> {
    config
        .enabled_sources()
        .map(|spec| Ok(Arc::new(ConfiguredSource::new(spec.clone())?) as Arc<dyn Source>))
        .collect()
}

/// Stable sort by each key in turn; each key is a list of aliases.
pub fn sort_records(items: &mut [Value], keys: &[Vec<String>]) {
    if keys.is_empty() {
        return;
    }
    items.sort_by(|a, b| {
        keys.iter()
            .map(|aliases| compare_values(key_of(a, aliases), key_of(b, aliases)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

fn key_of<'a>(item: &'a Value, aliases: &[String]) -> Option<&'a Value> {
    item.as_object().and_then(|record| field(record, aliases))
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(_) => 4,
    }
}

/// Total order over JSON values: missing, bools, numbers, strings, rest.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) if rank(a) == 4 && rank(b) == 4 => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}
