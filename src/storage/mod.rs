//! Versioned snapshot storage.
//!
//! Every document is a pretty-printed JSON value under a store path. Writes
//! carry the last-known revision token; the backend rejects stale tokens with
//! [`AppError::Conflict`], and [`SnapshotStore`] recovers by re-reading the
//! current revision and retrying exactly once.
//!
//! ## Backends
//!
//! - [`LocalStorage`]: files on disk, SHA-256 revisions, `.changes.jsonl` log
//! - `GithubStorage`: GitHub contents API with a Git Data API path for
//!   payloads too large for the contents API

#[cfg(feature = "github")]
pub mod github;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::Committer;

// Re-export for convenience
#[cfg(feature = "github")]
pub use github::GithubStorage;
pub use local::LocalStorage;

/// Current content of a document and its revision token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub content: String,
    pub revision: String,
}

/// Hashes returned by a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// New revision token of the document
    pub content_hash: String,
    /// Identifier of the change (commit) that wrote it
    pub change_hash: String,
}

/// Arguments of a single write attempt.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub path: &'a str,
    pub content: &'a str,
    /// `None` asserts that the document does not exist yet
    pub revision: Option<&'a str>,
    pub message: &'a str,
    pub committer: &'a Committer,
}

/// Raw document storage with optimistic concurrency.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Short description for logs, e.g. `github:owner/repo`.
    fn describe(&self) -> String;

    /// Read a document. Missing documents yield [`AppError::NotFound`].
    async fn get(&self, path: &str) -> Result<StoredDocument>;

    /// Write a document. A missing or stale revision yields
    /// [`AppError::Conflict`].
    async fn put(&self, request: &WriteRequest<'_>) -> Result<WriteReceipt>;

    /// Human-facing link to a change, if the backend has one.
    fn change_url(&self, _receipt: &WriteReceipt) -> Option<String> {
        None
    }
}

/// Snapshot store with attributable writes and bounded conflict recovery.
#[derive(Clone)]
pub struct SnapshotStore {
    backend: Arc<dyn ContentBackend>,
    committer: Committer,
}

impl SnapshotStore {
    pub fn new(backend: Arc<dyn ContentBackend>, committer: Committer) -> Self {
        Self { backend, committer }
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub fn committer(&self) -> &Committer {
        &self.committer
    }

    /// Read the current document.
    pub async fn read(&self, path: &str) -> Result<StoredDocument> {
        self.backend.get(path).await
    }

    /// Read the current document, mapping `NotFound` to `None`.
    pub async fn read_optional(&self, path: &str) -> Result<Option<StoredDocument>> {
        match self.backend.get(path).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a document.
    ///
    /// On a conflict the current revision is re-read and the write retried
    /// once; a second conflict fails with
    /// [`AppError::ConflictRetryExhausted`].
    pub async fn write(
        &self,
        path: &str,
        content: &str,
        revision: Option<&str>,
        message: &str,
    ) -> Result<WriteReceipt> {
        let request = WriteRequest {
            path,
            content,
            revision,
            message,
            committer: &self.committer,
        };

        match self.backend.put(&request).await {
            Err(e) if e.is_conflict() => {
                log::warn!("{}: {}; re-reading current revision", path, e);
            }
            other => return other,
        }

        let current = self.read_optional(path).await?;
        let retry = WriteRequest {
            revision: current.as_ref().map(|doc| doc.revision.as_str()),
            ..request
        };

        match self.backend.put(&retry).await {
            Err(e) if e.is_conflict() => {
                log::error!("{}: conflict persisted after retry: {}", path, e);
                Err(AppError::ConflictRetryExhausted(path.to_string()))
            }
            other => other,
        }
    }

    pub fn change_url(&self, receipt: &WriteReceipt) -> Option<String> {
        self.backend.change_url(receipt)
    }
}
