//! End-to-end scrape cycles against the local store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use disaster_data::error::{AppError, Result};
use disaster_data::models::{Committer, Config, Record, SourceKind, SourceSpec};
use disaster_data::notify::{CycleEvent, Dispatcher, Notifier, OutcomeKind};
use disaster_data::pipeline::{IdentityResolver, RecordDisplay, Runner, ScrapeCycle};
use disaster_data::services::{ConfiguredSource, Source};
use disaster_data::storage::{ContentBackend, LocalStorage, SnapshotStore, WriteRequest};
use reqwest::Client;
use serde_json::{Value, json};
use tempfile::TempDir;

/// Source whose next payloads are pushed by the test.
struct Queued {
    inner: ConfiguredSource,
    queue: Arc<Mutex<VecDeque<Option<Value>>>>,
}

impl RecordDisplay for Queued {
    fn display_one(&self, record: &Record) -> String {
        self.inner.display_one(record)
    }

    fn display_pair(&self, old: &Record, new: &Record) -> String {
        self.inner.display_pair(old, new)
    }
}

#[async_trait]
impl Source for Queued {
    fn spec(&self) -> &SourceSpec {
        self.inner.spec()
    }

    async fn fetch(&self, _client: &Client) -> Result<Option<Value>> {
        Ok(self.queue.lock().unwrap().pop_front().flatten())
    }

    fn identity(&self) -> Option<&IdentityResolver> {
        self.inner.identity()
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<CycleEvent>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, event: &CycleEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    fn name(&self) -> &str {
        "broken"
    }

    async fn notify(&self, _event: &CycleEvent) -> Result<()> {
        Err(AppError::notify("invalid_auth"))
    }
}

struct Harness {
    tmp: TempDir,
    queue: Arc<Mutex<VecDeque<Option<Value>>>>,
    notifier: Arc<RecordingNotifier>,
    runner: Runner,
}

impl Harness {
    fn new(extra: Option<Arc<dyn Notifier>>) -> Self {
        let tmp = TempDir::new().unwrap();
        Self::in_dir(tmp, extra)
    }

    fn in_dir(tmp: TempDir, extra: Option<Arc<dyn Notifier>>) -> Self {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let source: Arc<dyn Source> = Arc::new(Queued {
            inner: ConfiguredSource::new(shelter_spec()).unwrap(),
            queue: queue.clone(),
        });

        let notifier = Arc::new(RecordingNotifier::default());
        let mut dispatcher = Dispatcher::new();
        if let Some(extra) = extra {
            dispatcher.register(extra);
        }
        dispatcher.register(notifier.clone());

        let runner = Runner::new(vec![source], ScrapeCycle::new(store(&tmp), Client::new()), dispatcher);
        Self {
            tmp,
            queue,
            notifier,
            runner,
        }
    }

    fn push(&self, payload: Option<Value>) {
        self.queue.lock().unwrap().push_back(payload);
    }

    fn stored(&self) -> Value {
        let text = std::fs::read_to_string(self.tmp.path().join("shelters.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn storage(&self) -> LocalStorage {
        LocalStorage::new(self.tmp.path())
    }

    fn notified(&self) -> Vec<CycleEvent> {
        self.notifier.events.lock().unwrap().clone()
    }
}

fn shelter_spec() -> SourceSpec {
    let mut spec = SourceSpec::new("shelters.json", SourceKind::Json, "https://example.com/shelters");
    spec.noun = "shelter".into();
    spec.identity = vec!["id".into()];
    spec.display = Some("{name}".into());
    spec
}

fn store(tmp: &TempDir) -> SnapshotStore {
    SnapshotStore::new(
        Arc::new(LocalStorage::new(tmp.path())),
        Committer {
            name: "irma-scraper".into(),
            email: "irma-scraper@example.com".into(),
        },
    )
}

fn shelter_a() -> Value {
    json!({"id": "A", "name": "Shelter A"})
}

fn shelter_b() -> Value {
    json!({"id": "B", "name": "Shelter B"})
}

#[tokio::test]
async fn test_added_shelter_is_versioned_and_notified() {
    let mut h = Harness::new(None);

    h.push(Some(json!([shelter_a()])));
    let report = h.runner.run_pass().await.unwrap();
    assert_eq!(report.created, 1);

    h.push(Some(json!([shelter_a(), shelter_b()])));
    let report = h.runner.run_pass().await.unwrap();
    assert_eq!(report.updated, 1);

    assert_eq!(h.stored(), json!([shelter_a(), shelter_b()]));

    let events = h.notified();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, OutcomeKind::Created);

    let message = events[1].message.as_ref().unwrap();
    assert_eq!(message.summary, "shelters: 1 shelter added");
    let lines: Vec<&str> = message.body.lines().collect();
    assert_eq!(lines, vec!["1 new shelter:", "Shelter B"]);

    // The commit message is summary + blank line + body
    let changes = h.storage().load_changes().await.unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].message, message.render());
    assert_eq!(changes[1].committer.name, "irma-scraper");
}

#[tokio::test]
async fn test_reordered_snapshot_is_not_a_change() {
    let mut h = Harness::new(None);

    h.push(Some(json!([shelter_a(), shelter_b()])));
    h.runner.run_pass().await.unwrap();

    h.push(Some(json!([shelter_b(), shelter_a()])));
    let report = h.runner.run_pass().await.unwrap();

    assert_eq!(report.unchanged, 1);
    assert_eq!(h.notified().len(), 1);
    assert_eq!(h.storage().load_changes().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_restart_reads_previous_snapshot_from_store() {
    let mut first = Harness::new(None);
    first.push(Some(json!([shelter_a()])));
    first.runner.run_pass().await.unwrap();

    // A new process knows nothing but the store
    let Harness { tmp, .. } = first;
    let mut second = Harness::in_dir(tmp, None);
    assert!(second.runner.state("shelters.json").is_none());

    second.push(Some(json!([shelter_b()])));
    let report = second.runner.run_pass().await.unwrap();
    assert_eq!(report.updated, 1);

    let message = second.notified()[0].message.clone().unwrap();
    assert_eq!(message.summary, "shelters: 1 shelter added, 1 shelter removed");
    let blocks: Vec<&str> = message.body.split("\n\n").collect();
    assert_eq!(blocks, vec!["1 new shelter:\nShelter B", "1 shelter removed:\nShelter A"]);
}

#[tokio::test]
async fn test_notifier_failure_keeps_the_write() {
    let mut h = Harness::new(Some(Arc::new(BrokenNotifier)));

    h.push(Some(json!([shelter_a()])));
    let report = h.runner.run_pass().await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.stored(), json!([shelter_a()]));
    assert_eq!(h.notified().len(), 1);
}

#[tokio::test]
async fn test_no_data_skips_without_side_effects() {
    let mut h = Harness::new(None);

    h.push(None);
    let report = h.runner.run_pass().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert!(h.notified().is_empty());
    assert!(!h.tmp.path().join("shelters.json").exists());
}

#[tokio::test]
async fn test_concurrent_writer_is_recovered_once() {
    let mut h = Harness::new(None);

    h.push(Some(json!([shelter_a()])));
    h.runner.run_pass().await.unwrap();
    let cached = h.runner.state("shelters.json").unwrap().clone();

    // Another process updates the document behind our back
    let storage = h.storage();
    let committer = Committer::default();
    storage
        .put(&WriteRequest {
            path: "shelters.json",
            content: "[]",
            revision: cached.last_revision.as_deref(),
            message: "Updated shelters",
            committer: &committer,
        })
        .await
        .unwrap();

    h.push(Some(json!([shelter_a(), shelter_b()])));
    let report = h.runner.run_pass().await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(h.stored(), json!([shelter_a(), shelter_b()]));
    assert_eq!(h.storage().load_changes().await.unwrap().len(), 3);
}

#[test]
fn test_sample_config_is_valid() {
    let config = Config::load("data/config.toml").unwrap();
    config.validate().unwrap();
    for spec in config.enabled_sources() {
        ConfiguredSource::new(spec.clone()).unwrap();
    }
}
