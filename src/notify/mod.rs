//! Outcome events and best-effort notification.
//!
//! The cycle controller emits one [`CycleEvent`] per document and pass. The
//! [`Dispatcher`] forwards persisted creations and updates to every
//! registered [`Notifier`]; delivery failures are logged and dropped, so a
//! snapshot write is never undone by a notification problem.

#[cfg(feature = "slack")]
pub mod slack;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::format::Message;
use crate::storage::WriteReceipt;

#[cfg(feature = "slack")]
pub use slack::SlackNotifier;

/// What a cycle did with one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Created,
    Updated,
    Unchanged,
    /// Source returned no data
    Skipped,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Created => "created",
            OutcomeKind::Updated => "updated",
            OutcomeKind::Unchanged => "unchanged",
            OutcomeKind::Skipped => "skipped",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one scrape cycle.
#[derive(Debug, Clone)]
pub struct CycleEvent {
    /// Store path of the document
    pub document: String,
    pub kind: OutcomeKind,
    pub message: Option<Message>,
    /// Present only when the snapshot was persisted
    pub receipt: Option<WriteReceipt>,
    /// Human-facing link to the persisted change
    pub reference_url: Option<String>,
    /// Notifications are disabled for this document
    pub silent: bool,
}

impl CycleEvent {
    pub fn unchanged(document: impl Into<String>) -> Self {
        Self::bare(document, OutcomeKind::Unchanged)
    }

    pub fn skipped(document: impl Into<String>) -> Self {
        Self::bare(document, OutcomeKind::Skipped)
    }

    fn bare(document: impl Into<String>, kind: OutcomeKind) -> Self {
        Self {
            document: document.into(),
            kind,
            message: None,
            receipt: None,
            reference_url: None,
            silent: false,
        }
    }

    pub fn persisted(&self) -> bool {
        self.receipt.is_some()
    }

    /// Whether notifiers should hear about this event.
    pub fn is_deliverable(&self) -> bool {
        matches!(self.kind, OutcomeKind::Created | OutcomeKind::Updated)
            && self.persisted()
            && self.message.is_some()
            && !self.silent
    }
}

/// Delivers change messages to an operator channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, event: &CycleEvent) -> Result<()>;
}

/// Notifier that writes the headline to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &CycleEvent) -> Result<()> {
        if let Some(message) = &event.message {
            match &event.reference_url {
                Some(url) => log::info!("[notify] {} ({})", message.summary, url),
                None => log::info!("[notify] {}", message.summary),
            }
        }
        Ok(())
    }
}

/// Fans events out to every registered notifier.
#[derive(Clone, Default)]
pub struct Dispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.register(notifier);
        self
    }

    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// Deliver an event, returning how many notifiers accepted it.
    ///
    /// Never fails: errors are logged per notifier.
    pub async fn dispatch(&self, event: &CycleEvent) -> usize {
        if !event.is_deliverable() {
            return 0;
        }

        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.notify(event).await {
                Ok(()) => delivered += 1,
                Err(e) => log::warn!(
                    "{}: {} notification failed: {}",
                    event.document,
                    notifier.name(),
                    e
                ),
            }
        }
        delivered
    }
}
