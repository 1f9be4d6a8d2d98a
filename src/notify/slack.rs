//! Slack `chat.postMessage` notifier.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::NotifierConfig;
use crate::notify::{CycleEvent, Notifier};

/// Posts one attachment per persisted change to a Slack channel.
pub struct SlackNotifier {
    client: Client,
    api_url: String,
    token: String,
    channel: String,
    bot_name: String,
    icon_emoji: String,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackNotifier {
    /// Returns `None` when no channel is configured.
    pub fn new(client: Client, config: &NotifierConfig, token: impl Into<String>) -> Option<Self> {
        let channel = config.channel.as_deref().filter(|c| !c.trim().is_empty())?;
        Some(Self {
            client,
            api_url: config.api_url.clone(),
            token: token.into(),
            channel: channel.to_string(),
            bot_name: config.bot_name.clone(),
            icon_emoji: config.icon_emoji.clone(),
        })
    }

    fn attachments(event: &CycleEvent) -> Value {
        let (pretext, body) = event
            .message
            .as_ref()
            .map(|m| (m.summary.as_str(), m.body.trim()))
            .unwrap_or_default();
        let short_hash: String = event
            .receipt
            .as_ref()
            .map(|r| r.change_hash.chars().take(8).collect())
            .unwrap_or_default();
        let link = event.reference_url.as_deref().unwrap_or_default();
        let fallback = if link.is_empty() { pretext } else { link };

        json!([{
            "fallback": fallback,
            "pretext": pretext,
            "title": format!("{}: {}", event.document, short_hash),
            "title_link": link,
            "text": body,
        }])
    }

    fn form(&self, event: &CycleEvent) -> Vec<(&'static str, String)> {
        vec![
            ("token", self.token.clone()),
            ("channel", self.channel.clone()),
            ("attachments", Self::attachments(event).to_string()),
            ("icon_emoji", self.icon_emoji.clone()),
            ("username", self.bot_name.clone()),
        ]
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn notify(&self, event: &CycleEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.api_url)
            .form(&self.form(event))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::api("slack", status.as_u16(), response.text().await?));
        }

        let reply: SlackResponse = response.json().await?;
        if !reply.ok {
            return Err(AppError::notify(
                reply.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }

        log::debug!("{}: posted to {}", event.document, self.channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::OutcomeKind;
    use crate::pipeline::format::Message;
    use crate::storage::WriteReceipt;

    fn config(channel: Option<&str>) -> NotifierConfig {
        NotifierConfig {
            channel: channel.map(str::to_string),
            ..NotifierConfig::default()
        }
    }

    fn event() -> CycleEvent {
        CycleEvent {
            document: "fema-open-shelters.json".into(),
            kind: OutcomeKind::Updated,
            message: Some(Message {
                summary: "fema-open-shelters: 1 shelter added".into(),
                body: "1 new shelter:\nShelter B\n".into(),
            }),
            receipt: Some(WriteReceipt {
                content_hash: "blob".into(),
                change_hash: "0123456789abcdef".into(),
            }),
            reference_url: Some("https://github.com/o/r/commit/0123456789abcdef".into()),
            silent: false,
        }
    }

    #[test]
    fn test_requires_channel() {
        assert!(SlackNotifier::new(Client::new(), &config(None), "t").is_none());
        assert!(SlackNotifier::new(Client::new(), &config(Some(" ")), "t").is_none());
        assert!(SlackNotifier::new(Client::new(), &config(Some("#shelters")), "t").is_some());
    }

    #[test]
    fn test_attachment_shape() {
        let attachments = SlackNotifier::attachments(&event());
        let first = &attachments[0];

        assert_eq!(first["pretext"], "fema-open-shelters: 1 shelter added");
        assert_eq!(first["title"], "fema-open-shelters.json: 01234567");
        assert_eq!(first["title_link"], "https://github.com/o/r/commit/0123456789abcdef");
        assert_eq!(first["fallback"], first["title_link"]);
        assert_eq!(first["text"], "1 new shelter:\nShelter B");
    }

    #[test]
    fn test_form_fields() {
        let notifier = SlackNotifier::new(Client::new(), &config(Some("#shelters")), "xoxb").unwrap();
        let form = notifier.form(&event());
        let keys: Vec<&str> = form.iter().map(|(k, _)| *k).collect();

        assert_eq!(keys, vec!["token", "channel", "attachments", "icon_emoji", "username"]);
        assert_eq!(form[0].1, "xoxb");
        assert_eq!(form[4].1, "Disaster Scraper");
        let parsed: Value = serde_json::from_str(&form[2].1).unwrap();
        assert!(parsed.is_array());
    }
}
