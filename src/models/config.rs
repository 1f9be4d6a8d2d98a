//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{SourceKind, SourceSpec};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Polling loop and HTTP behavior
    #[serde(default)]
    pub poll: PollConfig,

    /// Snapshot store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Operator notification channel
    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// One entry per document
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SourceSpec>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.poll.user_agent.trim().is_empty() {
            return Err(AppError::validation("poll.user_agent is empty"));
        }
        if self.poll.timeout_secs == 0 {
            return Err(AppError::validation("poll.timeout_secs must be > 0"));
        }
        if self.poll.interval_secs == 0 {
            return Err(AppError::validation("poll.interval_secs must be > 0"));
        }
        if self.poll.max_backoff_secs < self.poll.interval_secs {
            return Err(AppError::validation(
                "poll.max_backoff_secs must be >= poll.interval_secs",
            ));
        }
        if self.store.committer.name.trim().is_empty()
            || self.store.committer.email.trim().is_empty()
        {
            return Err(AppError::validation(
                "store.committer needs both name and email",
            ));
        }
        if self.store.backend == StoreBackend::Github
            && (self.store.owner.trim().is_empty() || self.store.repo.trim().is_empty())
        {
            return Err(AppError::validation(
                "store.owner and store.repo are required for the github backend",
            ));
        }
        if self.store.inline_limit_bytes == 0 {
            return Err(AppError::validation("store.inline_limit_bytes must be > 0"));
        }
        if self.enabled_sources().next().is_none() {
            return Err(AppError::validation("No enabled sources defined"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.path.as_str()) {
                return Err(AppError::validation(format!(
                    "Document {} is owned by more than one source",
                    source.path
                )));
            }
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceSpec> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn find_source(&self, path: &str) -> Option<&SourceSpec> {
        self.sources
            .iter()
            .find(|s| s.path == path || s.display_name() == path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            store: StoreConfig::default(),
            notifier: NotifierConfig::default(),
            logging: LoggingConfig::default(),
            sources: defaults::sources(),
        }
    }
}

/// Polling loop and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Sleep between full passes, in seconds
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Upper bound for the backoff after a rate-limited pass
    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_secs: u64,

    /// Format messages but never persist or notify
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            timeout_secs: defaults::timeout(),
            user_agent: defaults::user_agent(),
            max_backoff_secs: defaults::max_backoff(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Github,
    Local,
}

/// Identity attached to every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Default for Committer {
    fn default() -> Self {
        Self {
            name: "disaster-scraper".into(),
            email: "disaster-scraper@example.com".into(),
        }
    }
}

/// Snapshot store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "defaults::backend")]
    pub backend: StoreBackend,

    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub repo: String,

    #[serde(default = "defaults::branch")]
    pub branch: String,

    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// Base for human-facing commit links
    #[serde(default = "defaults::web_base")]
    pub web_base: String,

    /// Root directory for the local backend
    #[serde(default = "defaults::local_dir")]
    pub local_dir: String,

    /// Payloads above this size go through the Git Data API
    #[serde(default = "defaults::inline_limit")]
    pub inline_limit_bytes: usize,

    #[serde(default)]
    pub committer: Committer,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: defaults::backend(),
            owner: String::new(),
            repo: String::new(),
            branch: defaults::branch(),
            api_base: defaults::api_base(),
            web_base: defaults::web_base(),
            local_dir: defaults::local_dir(),
            inline_limit_bytes: defaults::inline_limit(),
            committer: Committer::default(),
        }
    }
}

/// Notifier settings. The access token comes from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "defaults::slack_api")]
    pub api_url: String,

    /// Channel to post into; no channel disables posting
    #[serde(default)]
    pub channel: Option<String>,

    #[serde(default = "defaults::bot_name")]
    pub bot_name: String,

    #[serde(default = "defaults::icon_emoji")]
    pub icon_emoji: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::slack_api(),
            channel: None,
            bot_name: defaults::bot_name(),
            icon_emoji: defaults::icon_emoji(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use super::{SourceKind, SourceSpec, StoreBackend};

    // Poll defaults
    pub fn interval() -> u64 {
        120
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; disaster-data/0.1)".into()
    }
    pub fn max_backoff() -> u64 {
        1800
    }

    // Store defaults
    pub fn backend() -> StoreBackend {
        StoreBackend::Local
    }
    pub fn branch() -> String {
        "master".into()
    }
    pub fn api_base() -> String {
        "https://api.github.com".into()
    }
    pub fn web_base() -> String {
        "https://github.com".into()
    }
    pub fn local_dir() -> String {
        "storage".into()
    }
    pub fn inline_limit() -> usize {
        1_000_000
    }

    // Notifier defaults
    pub fn slack_api() -> String {
        "https://slack.com/api/chat.postMessage".into()
    }
    pub fn bot_name() -> String {
        "Disaster Scraper".into()
    }
    pub fn icon_emoji() -> String {
        ":robot_face:".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    // Source defaults: the public shelter feature layers
    pub fn sources() -> Vec<SourceSpec> {
        vec![
            gis_shelters(
                "fema-open-shelters.json",
                "https://gis.fema.gov/REST/services/NSS/OpenShelters/MapServer/0/query?f=json&where=1%3D1&returnGeometry=false&outFields=*",
                None,
            ),
            gis_shelters(
                "fema-nss.json",
                "https://gis.fema.gov/REST/services/NSS/FEMA_NSS/MapServer/0/query?f=json&where=1%3D1&returnGeometry=false&outFields=*",
                None,
            ),
            gis_shelters(
                "georgia-gema-animal-shelters.json",
                "https://services1.arcgis.com/2iUE8l8JKrP2tygQ/arcgis/rest/services/AnimalShelters/FeatureServer/0/query?f=json&where=status%20%3D%20%27OPEN%27&returnGeometry=false&outFields=*&resultOffset=0&resultRecordCount=1000",
                Some("https://gema-soc.maps.arcgis.com/apps/webappviewer/index.html?id=279ef7cfc1da45edb640723c12b02b18"),
            ),
            gis_shelters(
                "georgia-gema-active-shelters.json",
                "https://services1.arcgis.com/2iUE8l8JKrP2tygQ/arcgis/rest/services/SheltersActive/FeatureServer/0/query?f=json&where=1%3D1&returnGeometry=false&outFields=*&resultOffset=0&resultRecordCount=1000",
                Some("https://gema-soc.maps.arcgis.com/apps/webappviewer/index.html?id=279ef7cfc1da45edb640723c12b02b18"),
            ),
        ]
    }

    fn gis_shelters(path: &str, url: &str, source_url: Option<&str>) -> SourceSpec {
        let mut spec = SourceSpec::new(path, SourceKind::Arcgis, url);
        spec.noun = "shelter".into();
        spec.identity = vec!["OBJECTID".into(), "ObjectID".into()];
        spec.source_url = source_url.map(str::to_string);
        spec
    }
}
