//! Local filesystem storage implementation.
//!
//! Mirrors the remote store's contract for development and testing.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── .lock                 # Held exclusively for the duration of every write
//! ├── .changes.jsonl        # Append-only change log (one JSON line per write)
//! ├── fema-open-shelters.json
//! └── fema-nss.json
//! ```
//!
//! The revision token of a document is the hex SHA-256 of its bytes. A write
//! checks the revision, replaces the file and appends to the change log under
//! one advisory lock, so concurrent writers (threads or processes) holding
//! the same revision see exactly one success and conflicts for the rest.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{AppError, Result};
use crate::models::Committer;
use crate::storage::{ContentBackend, StoredDocument, WriteReceipt, WriteRequest};

const CHANGE_LOG: &str = ".changes.jsonl";
const LOCK_FILE: &str = ".lock";

/// One line of the change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub change_hash: String,
    pub path: String,
    pub content_hash: String,
    /// Revision the write replaced, if any
    pub parent: Option<String>,
    pub message: String,
    pub committer: Committer,
    pub timestamp: DateTime<Utc>,
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a store path, refusing to escape the root.
    fn path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(AppError::validation(format!("invalid store path: {key}")));
        }
        Ok(self.root_dir.join(relative))
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Load the change log, oldest first.
    pub async fn load_changes(&self) -> Result<Vec<ChangeEntry>> {
        let Some(bytes) = self.read_bytes(&self.root_dir.join(CHANGE_LOG)).await? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8_lossy(&bytes);
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AppError::from))
            .collect()
    }
}

/// Owned copy of a write request, committed on a blocking thread.
struct PendingWrite {
    root_dir: PathBuf,
    file: PathBuf,
    path: String,
    content: String,
    revision: Option<String>,
    message: String,
    committer: Committer,
}

impl PendingWrite {
    fn commit(self) -> Result<WriteReceipt> {
        fs::create_dir_all(&self.root_dir)?;
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root_dir.join(LOCK_FILE))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock.write()?;

        let current = read_existing(&self.file)?.map(|bytes| content_hash(&bytes));
        match (current.as_deref(), self.revision.as_deref()) {
            (Some(_), None) => {
                return Err(AppError::conflict(&self.path, "document already exists"));
            }
            (None, Some(_)) => {
                return Err(AppError::conflict(&self.path, "document does not exist"));
            }
            (Some(current), Some(expected)) if current != expected => {
                return Err(AppError::conflict(
                    &self.path,
                    format!("stale revision {expected}, current is {current}"),
                ));
            }
            _ => {}
        }

        let bytes = self.content.as_bytes();
        write_atomic(&self.file, bytes)?;

        let content_hash = content_hash(bytes);
        let timestamp = Utc::now();
        let change_hash = change_hash(
            &self.path,
            &content_hash,
            current.as_deref(),
            &self.message,
            &self.committer,
            &timestamp,
        );

        append_change(
            &self.root_dir,
            &ChangeEntry {
                change_hash: change_hash.clone(),
                path: self.path,
                content_hash: content_hash.clone(),
                parent: current,
                message: self.message,
                committer: self.committer,
                timestamp,
            },
        )?;

        log::info!("Wrote {} bytes to {}", bytes.len(), self.file.display());

        Ok(WriteReceipt {
            content_hash,
            change_hash,
        })
    }
}

fn read_existing(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Write through a uniquely named temp file in the target directory, then
/// rename it over the document.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let Some(dir) = path.parent() else {
        return Err(AppError::validation(format!("invalid store path: {}", path.display())));
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn append_change(root_dir: &Path, entry: &ChangeEntry) -> Result<()> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(root_dir.join(CHANGE_LOG))?;
    file.write_all(&line)?;
    file.flush()?;
    Ok(())
}

/// Hex SHA-256 of a byte string.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn change_hash(
    path: &str,
    content_hash: &str,
    parent: Option<&str>,
    message: &str,
    committer: &Committer,
    timestamp: &DateTime<Utc>,
) -> String {
    let stamp = timestamp.to_rfc3339();
    let mut hasher = Sha256::new();
    for part in [
        path,
        content_hash,
        parent.unwrap_or(""),
        message,
        committer.name.as_str(),
        committer.email.as_str(),
        stamp.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ContentBackend for LocalStorage {
    fn describe(&self) -> String {
        format!("local:{}", self.root_dir.display())
    }

    async fn get(&self, key: &str) -> Result<StoredDocument> {
        let path = self.path(key)?;
        let bytes = self
            .read_bytes(&path)
            .await?
            .ok_or_else(|| AppError::NotFound(key.to_string()))?;

        let revision = content_hash(&bytes);
        let content = String::from_utf8(bytes)
            .map_err(|e| AppError::validation(format!("{key} is not valid UTF-8: {e}")))?;
        Ok(StoredDocument { content, revision })
    }

    async fn put(&self, request: &WriteRequest<'_>) -> Result<WriteReceipt> {
        let pending = PendingWrite {
            root_dir: self.root_dir.clone(),
            file: self.path(request.path)?,
            path: request.path.to_string(),
            content: request.content.to_string(),
            revision: request.revision.map(str::to_string),
            message: request.message.to_string(),
            committer: request.committer.clone(),
        };

        // The lock blocks, so the whole commit runs off the async workers
        tokio::task::spawn_blocking(move || pending.commit())
            .await
            .map_err(io::Error::from)?
    }
}
