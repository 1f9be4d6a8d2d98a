// src/config.rs

//! Configuration loading and wiring.
//!
//! Reads the TOML configuration, picks up secrets from the environment and
//! assembles the store, notifiers and runner from them.

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{Config, NotifierConfig, StoreBackend, StoreConfig};
use crate::notify::{Dispatcher, LogNotifier};
use crate::pipeline::{Runner, ScrapeCycle};
use crate::services::build_sources;
use crate::storage::{ContentBackend, LocalStorage, SnapshotStore};
use crate::utils::http;

pub const GITHUB_TOKEN_VAR: &str = "GITHUB_API_TOKEN";
pub const SLACK_TOKEN_VAR: &str = "SLACK_TOKEN";

/// Access tokens, read once at start.
#[derive(Clone, Default)]
pub struct Secrets {
    pub github_token: Option<String>,
    pub slack_token: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            github_token: read(GITHUB_TOKEN_VAR),
            slack_token: read(SLACK_TOKEN_VAR),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("github_token", &mask(&self.github_token))
            .field("slack_token", &mask(&self.slack_token))
            .finish()
    }
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults when the file does not exist; a file that exists
/// but does not parse is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::load_or_default(path));
    }
    Config::load(path).map_err(|e| AppError::config(format!("{}: {}", path.display(), e)))
}

/// Build the snapshot store for the configured backend.
pub fn build_store(config: &StoreConfig, client: &Client, secrets: &Secrets) -> Result<SnapshotStore> {
    let backend: Arc<dyn ContentBackend> = match config.backend {
        StoreBackend::Local => Arc::new(LocalStorage::new(&config.local_dir)),
        StoreBackend::Github => github_backend(config, client, secrets)?,
    };
    log::info!("Snapshot store: {}", backend.describe());
    Ok(SnapshotStore::new(backend, config.committer.clone()))
}

#[cfg(feature = "github")]
fn github_backend(
    config: &StoreConfig,
    client: &Client,
    secrets: &Secrets,
) -> Result<Arc<dyn ContentBackend>> {
    let token = secrets
        .github_token
        .clone()
        .ok_or_else(|| AppError::config(format!("{GITHUB_TOKEN_VAR} is required for the github store")))?;
    Ok(Arc::new(crate::storage::GithubStorage::new(
        client.clone(),
        config,
        token,
    )))
}

#[cfg(not(feature = "github"))]
fn github_backend(
    _config: &StoreConfig,
    _client: &Client,
    _secrets: &Secrets,
) -> Result<Arc<dyn ContentBackend>> {
    Err(AppError::config(
        "the github store needs the `github` feature",
    ))
}

/// Log notifier always; Slack when a token and channel are available.
pub fn build_dispatcher(config: &NotifierConfig, client: &Client, secrets: &Secrets) -> Dispatcher {
    let mut dispatcher = Dispatcher::new().with(Arc::new(LogNotifier));

    #[cfg(feature = "slack")]
    match &secrets.slack_token {
        Some(token) => match crate::notify::SlackNotifier::new(client.clone(), config, token) {
            Some(slack) => dispatcher.register(Arc::new(slack)),
            None => log::info!("No notifier channel configured; Slack disabled"),
        },
        None => log::info!("{} not set; Slack disabled", SLACK_TOKEN_VAR),
    }

    #[cfg(not(feature = "slack"))]
    let _ = (config, client, secrets);

    dispatcher
}

/// Assemble a runner for every enabled source.
pub fn build_runner(config: &Config, secrets: &Secrets, dry_run: bool) -> Result<Runner> {
    config.validate()?;
    let client = http::create_client(&config.poll)?;
    let store = build_store(&config.store, &client, secrets)?;
    let dispatcher = build_dispatcher(&config.notifier, &client, secrets);
    let sources = build_sources(config)?;

    let cycle = ScrapeCycle::new(store, client).dry_run(dry_run || config.poll.dry_run);
    Ok(Runner::new(sources, cycle, dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(config.sources.len(), 4);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[poll\ninterval_secs = ").unwrap();
        assert!(matches!(load_config(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn test_secrets_debug_is_masked() {
        let secrets = Secrets {
            github_token: Some("ghp_secret".into()),
            slack_token: None,
        };
        let text = format!("{secrets:?}");
        assert!(!text.contains("ghp_secret"));
        assert!(text.contains("<set>") && text.contains("<unset>"));
    }

    #[test]
    fn test_github_store_requires_token() {
        let config = StoreConfig {
            backend: StoreBackend::Github,
            owner: "simonw".into(),
            repo: "disaster-data".into(),
            ..StoreConfig::default()
        };
        let result = build_store(&config, &Client::new(), &Secrets::default());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_local_store() {
        let tmp = TempDir::new().unwrap();
        let config = StoreConfig {
            local_dir: tmp.path().display().to_string(),
            ..StoreConfig::default()
        };
        let store = build_store(&config, &Client::new(), &Secrets::default()).unwrap();
        assert!(store.describe().starts_with("local:"));
    }

    #[test]
    fn test_dispatcher_without_slack_token() {
        let dispatcher = build_dispatcher(&NotifierConfig::default(), &Client::new(), &Secrets::default());
        assert_eq!(dispatcher.names(), vec!["log"]);
    }

    #[cfg(feature = "slack")]
    #[test]
    fn test_dispatcher_with_slack() {
        let config = NotifierConfig {
            channel: Some("#shelter_scraper_data".into()),
            ..NotifierConfig::default()
        };
        let secrets = Secrets {
            github_token: None,
            slack_token: Some("xoxb".into()),
        };
        let dispatcher = build_dispatcher(&config, &Client::new(), &secrets);
        assert_eq!(dispatcher.names(), vec!["log", "slack"]);
    }
}
