//! Polling loop over every configured document.
//!
//! Documents run sequentially, one full cycle each. A failure in one
//! document is logged and the pass moves on; only systemic errors (rate
//! limiting) end the pass early, and the loop then backs off.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::notify::{CycleEvent, Dispatcher, OutcomeKind};
use crate::pipeline::cycle::{DocumentState, ScrapeCycle};
use crate::services::Source;
use crate::utils::log as banner;

/// Per-pass outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// `(document, error)` for every failed document
    pub failures: Vec<(String, String)>,
}

impl PassReport {
    fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Created => self.created += 1,
            OutcomeKind::Updated => self.updated += 1,
            OutcomeKind::Unchanged => self.unchanged += 1,
            OutcomeKind::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.skipped + self.failed
    }

    fn log(&self) {
        banner::summary(
            "Pass complete",
            &[
                ("Created", self.created.to_string()),
                ("Updated", self.updated.to_string()),
                ("Unchanged", self.unchanged.to_string()),
                ("Skipped", self.skipped.to_string()),
                ("Failed", self.failed.to_string()),
            ],
        );
    }
}

/// Drives scrape cycles for a fixed list of sources.
pub struct Runner {
    sources: Vec<Arc<dyn Source>>,
    states: HashMap<String, DocumentState>,
    cycle: ScrapeCycle,
    dispatcher: Dispatcher,
}

impl Runner {
    pub fn new(sources: Vec<Arc<dyn Source>>, cycle: ScrapeCycle, dispatcher: Dispatcher) -> Self {
        Self {
            sources,
            states: HashMap::new(),
            cycle,
            dispatcher,
        }
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    /// Cached state of a document, once a cycle has loaded or written it.
    pub fn state(&self, path: &str) -> Option<&DocumentState> {
        self.states.get(path)
    }

    /// Run one cycle for one source and dispatch its event.
    pub async fn run_source(&mut self, source: &Arc<dyn Source>) -> Result<CycleEvent> {
        let path = source.spec().path.clone();
        let state = self.states.entry(path).or_default();
        let event = self.cycle.run(source.as_ref(), state).await?;

        let delivered = self.dispatcher.dispatch(&event).await;
        if delivered > 0 {
            banner::sub_item(&format!("{}: notified {} channel(s)", event.document, delivered));
        }
        Ok(event)
    }

    /// Process every source once.
    ///
    /// Per-document errors are counted and logged. A systemic error stops
    /// the pass and is returned.
    pub async fn run_pass(&mut self) -> Result<PassReport> {
        banner::header(if self.cycle.is_dry_run() {
            "Scrape pass (dry run)"
        } else {
            "Scrape pass"
        });

        let mut report = PassReport::default();
        let sources = self.sources.clone();
        let total = sources.len();

        for (i, source) in sources.iter().enumerate() {
            let path = source.spec().path.as_str();
            banner::step(i + 1, total, path);

            match self.run_source(source).await {
                Ok(event) => report.record(event.kind),
                Err(e) if e.is_systemic() => {
                    log::error!("!!!! {}: {} !!!!", path, e);
                    report.failed += 1;
                    report.log();
                    return Err(e);
                }
                Err(e) => {
                    log::error!("!!!! {}: {} !!!!", path, e);
                    report.failed += 1;
                    report.failures.push((path.to_string(), e.to_string()));
                }
            }
        }

        report.log();
        Ok(report)
    }

    /// Run passes forever, `interval` apart. After a systemic failure the
    /// wait doubles per consecutive failure, up to `max_backoff`.
    pub async fn run_forever(&mut self, interval: Duration, max_backoff: Duration) {
        let mut consecutive_failures = 0u32;
        loop {
            let wait = match self.run_pass().await {
                Ok(_) => {
                    consecutive_failures = 0;
                    interval
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let wait = backoff(interval, consecutive_failures, max_backoff);
                    log::warn!("Pass aborted: {}. Backing off for {:?}", e, wait);
                    wait
                }
            };

            banner::separator();
            log::info!("Sleeping {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// `interval * 2^failures`, capped at `max`.
pub fn backoff(interval: Duration, failures: u32, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(failures);
    interval.saturating_mul(factor).min(max)
}
