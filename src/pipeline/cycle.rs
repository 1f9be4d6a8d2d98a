//! One scrape cycle for one document.
//!
//! ```text
//! fetch ──None──▶ Skipped
//!   │
//! load previous (once, unless cached)
//!   │
//! compare ──equal──▶ Unchanged
//!   │
//! diff + format ──dry run──▶ Created/Updated, not persisted
//!   │
//! write ──▶ Created/Updated
//! ```
//!
//! Notification is not part of the cycle; the returned [`CycleEvent`] is
//! handed to the dispatcher by the caller.

use reqwest::Client;
use serde_json::Value;

use crate::error::Result;
use crate::models::{records_of, snapshots_equal};
use crate::notify::{CycleEvent, OutcomeKind};
use crate::pipeline::diff::DiffCalculator;
use crate::pipeline::format::{Message, MessageFormatter, Verb};
use crate::services::Source;
use crate::storage::SnapshotStore;

/// Last snapshot seen for a document, carried between cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentState {
    pub last_content: Option<Value>,
    pub last_revision: Option<String>,
}

impl DocumentState {
    pub fn is_loaded(&self) -> bool {
        self.last_revision.is_some()
    }
}

/// Runs fetch → diff → summarize → persist for a single document.
#[derive(Clone)]
pub struct ScrapeCycle {
    store: SnapshotStore,
    client: Client,
    dry_run: bool,
}

impl ScrapeCycle {
    pub fn new(store: SnapshotStore, client: Client) -> Self {
        Self {
            store,
            client,
            dry_run: false,
        }
    }

    /// Stop before persisting; the state is left untouched.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn run(&self, source: &dyn Source, state: &mut DocumentState) -> Result<CycleEvent> {
        let spec = source.spec();
        let path = spec.path.as_str();

        let Some(data) = source.fetch(&self.client).await? else {
            log::info!("{}: Data was None", path);
            return Ok(CycleEvent::skipped(path));
        };

        if !state.is_loaded() {
            if let Some(doc) = self.store.read_optional(path).await? {
                state.last_content = Some(serde_json::from_str(&doc.content)?);
                state.last_revision = Some(doc.revision);
            }
        }

        if let Some(previous) = &state.last_content {
            if snapshots_equal(previous, &data) {
                log::info!("{}: Nothing changed", path);
                return Ok(CycleEvent::unchanged(path));
            }
        }

        let (verb, kind) = if state.is_loaded() {
            log::info!("Updating {}", path);
            (Verb::Updated, OutcomeKind::Updated)
        } else {
            log::info!("Creating {}", path);
            (Verb::Created, OutcomeKind::Created)
        };

        let message = build_message(source, state.last_content.as_ref(), &data, verb)?;
        let content = serde_json::to_string_pretty(&data)?;

        let mut event = CycleEvent {
            document: path.to_string(),
            kind,
            message: None,
            receipt: None,
            reference_url: None,
            silent: !spec.notify,
        };

        if self.dry_run {
            log::info!("{}", message.render());
            log::info!("{}", content);
            event.message = Some(message);
            return Ok(event);
        }

        let receipt = self
            .store
            .write(
                path,
                &content,
                state.last_revision.as_deref(),
                &message.render(),
            )
            .await?;

        state.last_revision = Some(receipt.content_hash.clone());
        state.last_content = Some(data);

        event.reference_url = self.store.change_url(&receipt);
        if let Some(url) = &event.reference_url {
            log::info!("{}", url);
        }
        event.message = Some(message);
        event.receipt = Some(receipt);
        Ok(event)
    }
}

/// Diff-based message for record-list documents, generic otherwise.
pub fn build_message(
    source: &dyn Source,
    previous: Option<&Value>,
    current: &Value,
    verb: Verb,
) -> Result<Message> {
    let spec = source.spec();
    let Some(identity) = source.identity() else {
        return Ok(Message::generic(verb, spec.display_name()));
    };

    let old = match previous {
        Some(value) => records_of(value)?,
        None => Vec::new(),
    };
    let new = records_of(current)?;
    let changes = DiffCalculator::new().calculate(&old, &new, identity)?;

    Ok(MessageFormatter::new(spec.display_name(), source.noun())
        .show_changes(spec.show_changes)
        .source_url(spec.source_url.as_deref())
        .format(&changes, verb, source))
}
