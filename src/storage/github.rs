//! GitHub repository storage implementation.
//!
//! Documents are files on one branch of a repository. Reads and writes go
//! through the contents API; payloads it refuses as too large go through the
//! Git Data API instead (blob, tree, commit, ref update). Both paths return
//! the blob sha as revision and the commit sha as change hash.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::StoreConfig;
use crate::storage::{ContentBackend, StoredDocument, WriteReceipt, WriteRequest};

const SERVICE: &str = "github";

/// GitHub-backed snapshot storage.
pub struct GithubStorage {
    client: Client,
    api_base: String,
    web_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
    inline_limit: usize,
}

/// Successful body, or the contents API refusing the payload size.
enum Reply {
    Body(String),
    TooLarge,
}

/// How a failed response should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    NotFound,
    TooLarge,
    Conflict,
    RateLimited,
    Other,
}

/// The parts of a GitHub error body we act on.
#[derive(Debug, Default)]
struct ErrorBody {
    message: String,
    codes: Vec<String>,
}

impl ErrorBody {
    fn parse(text: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Self {
                message: text.trim().to_string(),
                codes: Vec::new(),
            };
        };

        let message = value["message"].as_str().unwrap_or_default().to_string();
        let codes = value["errors"]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("code").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self { message, codes }
    }
}

fn classify(status: u16, rate_remaining: Option<&str>, body: &ErrorBody) -> Failure {
    let message = body.message.to_lowercase();
    match status {
        404 => Failure::NotFound,
        429 => Failure::RateLimited,
        403 if rate_remaining == Some("0") || message.contains("rate limit") => {
            Failure::RateLimited
        }
        403 if body.codes.iter().any(|c| c == "too_large") => Failure::TooLarge,
        409 => Failure::Conflict,
        422 if message.contains("sha") || message.contains("fast forward") => Failure::Conflict,
        _ => Failure::Other,
    }
}

fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;
    String::from_utf8(bytes).map_err(|e| AppError::validation(format!("content is not UTF-8: {e}")))
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: ShaOnly,
    commit: ShaOnly,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaOnly,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaOnly,
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
    sha: String,
}

impl GithubStorage {
    pub fn new(client: Client, config: &StoreConfig, token: impl Into<String>) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            web_base: config.web_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: token.into(),
            inline_limit: config.inline_limit_bytes,
        }
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, suffix
        )
    }

    fn contents_url(&self, path: &str) -> String {
        self.repo_url(&format!("contents/{}", path.trim_start_matches('/')))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, format!("token {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Reply> {
        let response = builder.send().await?;
        let status = response.status();
        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;

        if status.is_success() {
            return Ok(Reply::Body(text));
        }

        let body = ErrorBody::parse(&text);
        match classify(status.as_u16(), remaining.as_deref(), &body) {
            Failure::TooLarge => Ok(Reply::TooLarge),
            Failure::NotFound => Err(AppError::NotFound(path.to_string())),
            Failure::Conflict => Err(AppError::conflict(path, body.message)),
            Failure::RateLimited => Err(AppError::rate_limited(SERVICE, body.message)),
            Failure::Other => Err(AppError::api(SERVICE, status.as_u16(), body.message)),
        }
    }

    /// Send a request whose payload size is never the problem.
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, path: &str) -> Result<T> {
        match self.send(builder, path).await? {
            Reply::Body(text) => Ok(serde_json::from_str(&text)?),
            Reply::TooLarge => Err(AppError::api(SERVICE, 403, "payload too large")),
        }
    }

    /// Blob sha of `path` in the given tree, if present.
    async fn blob_sha(&self, tree: &str, path: &str) -> Result<Option<String>> {
        let url = self.repo_url(&format!("git/trees/{tree}"));
        let listing: TreeResponse = self
            .send_json(self.request(Method::GET, &url).query(&[("recursive", "1")]), path)
            .await?;

        Ok(listing
            .tree
            .into_iter()
            .find(|entry| entry.path == path && entry.kind == "blob")
            .map(|entry| entry.sha))
    }

    /// Read through the Git Data API.
    async fn get_large(&self, path: &str) -> Result<StoredDocument> {
        log::debug!("{}: reading through the git data API", path);
        let sha = self
            .blob_sha(&self.branch, path)
            .await?
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;

        let url = self.repo_url(&format!("git/blobs/{sha}"));
        let blob: BlobResponse = self.send_json(self.request(Method::GET, &url), path).await?;
        let content = match blob.encoding.as_deref() {
            Some("base64") | None => decode_content(&blob.content)?,
            Some(_) => blob.content,
        };

        Ok(StoredDocument {
            content,
            revision: blob.sha,
        })
    }

    /// Write through the Git Data API: blob, tree, commit, then a
    /// non-forced ref update.
    async fn put_large(&self, request: &WriteRequest<'_>) -> Result<WriteReceipt> {
        let path = request.path;
        log::info!(
            "{}: {} bytes, writing through the git data API",
            path,
            request.content.len()
        );

        let ref_url = self.repo_url(&format!("git/ref/heads/{}", self.branch));
        let head: RefResponse = self.send_json(self.request(Method::GET, &ref_url), path).await?;
        let head_sha = head.object.sha;

        let commit_url = self.repo_url(&format!("git/commits/{head_sha}"));
        let head_commit: CommitResponse = self
            .send_json(self.request(Method::GET, &commit_url), path)
            .await?;
        let base_tree = head_commit.tree.sha;

        // The contents API checks the revision for us; here we check it ourselves
        let current = self.blob_sha(&base_tree, path).await?;
        match (current.as_deref(), request.revision) {
            (Some(_), None) => return Err(AppError::conflict(path, "document already exists")),
            (None, Some(_)) => return Err(AppError::conflict(path, "document does not exist")),
            (Some(current), Some(expected)) if current != expected => {
                return Err(AppError::conflict(
                    path,
                    format!("stale revision {expected}, current is {current}"),
                ));
            }
            _ => {}
        }

        let blob: ShaOnly = self
            .send_json(
                self.request(Method::POST, &self.repo_url("git/blobs"))
                    .json(&json!({ "content": request.content, "encoding": "utf-8" })),
                path,
            )
            .await?;

        let tree: ShaOnly = self
            .send_json(
                self.request(Method::POST, &self.repo_url("git/trees"))
                    .json(&json!({
                        "base_tree": base_tree,
                        "tree": [{
                            "path": path,
                            "mode": "100644",
                            "type": "blob",
                            "sha": blob.sha,
                        }],
                    })),
                path,
            )
            .await?;

        let commit: ShaOnly = self
            .send_json(
                self.request(Method::POST, &self.repo_url("git/commits"))
                    .json(&json!({
                        "message": request.message,
                        "tree": tree.sha,
                        "parents": [head_sha],
                        "committer": request.committer,
                    })),
                path,
            )
            .await?;

        let update_url = self.repo_url(&format!("git/refs/heads/{}", self.branch));
        let _: Value = self
            .send_json(
                self.request(Method::PATCH, &update_url)
                    .json(&json!({ "sha": commit.sha, "force": false })),
                path,
            )
            .await?;

        Ok(WriteReceipt {
            content_hash: blob.sha,
            change_hash: commit.sha,
        })
    }
}

#[async_trait]
impl ContentBackend for GithubStorage {
    fn describe(&self) -> String {
        format!("github:{}/{}@{}", self.owner, self.repo, self.branch)
    }

    async fn get(&self, path: &str) -> Result<StoredDocument> {
        let builder = self
            .request(Method::GET, &self.contents_url(path))
            .query(&[("ref", self.branch.as_str())]);

        let text = match self.send(builder, path).await? {
            Reply::Body(text) => text,
            Reply::TooLarge => return self.get_large(path).await,
        };

        let data: ContentResponse = serde_json::from_str(&text)?;
        // Files between 1 and 100 MB come back without inline content
        if data.encoding.as_deref() == Some("none") {
            return self.get_large(path).await;
        }

        Ok(StoredDocument {
            content: decode_content(&data.content)?,
            revision: data.sha,
        })
    }

    async fn put(&self, request: &WriteRequest<'_>) -> Result<WriteReceipt> {
        if request.content.len() > self.inline_limit {
            return self.put_large(request).await;
        }

        let mut payload = json!({
            "message": request.message,
            "content": STANDARD.encode(request.content),
            "branch": self.branch,
            "committer": request.committer,
        });
        if let Some(sha) = request.revision {
            payload["sha"] = json!(sha);
        }

        let builder = self
            .request(Method::PUT, &self.contents_url(request.path))
            .json(&payload);

        match self.send(builder, request.path).await? {
            Reply::Body(text) => {
                let updated: PutResponse = serde_json::from_str(&text)?;
                Ok(WriteReceipt {
                    content_hash: updated.content.sha,
                    change_hash: updated.commit.sha,
                })
            }
            Reply::TooLarge => self.put_large(request).await,
        }
    }

    fn change_url(&self, receipt: &WriteReceipt) -> Option<String> {
        Some(format!(
            "{}/{}/{}/commit/{}",
            self.web_base, self.owner, self.repo, receipt.change_hash
        ))
    }
}
