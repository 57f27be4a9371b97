//! A client for posting and editing notifications through a Discord webhook.

use super::{MessageApi, SinkError};
use crate::config::DiscordConfig;
use crate::formatting::Notification;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

pub const NAME: &str = "discord";

/// Discord rejects messages with more embeds than this.
const MAX_EMBEDS: usize = 10;

/// Executes the webhook with `?wait=true` so Discord returns the created
/// message, and edits it through `/messages/{id}`. The handle is the message id.
pub struct DiscordWebhook {
    client: reqwest::Client,
    webhook_url: String,
}

impl std::fmt::Debug for DiscordWebhook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The webhook URL embeds its secret token.
        f.debug_struct("DiscordWebhook").finish_non_exhaustive()
    }
}

impl DiscordWebhook {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        let webhook_url: String = webhook_url.into();
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.trim_end_matches('/').to_string(),
        }
    }

    /// Builds the client, or `SinkError::NotEnabled` when no webhook URL is set.
    pub fn from_config(config: &DiscordConfig) -> Result<Self, SinkError> {
        match config.webhook_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => Ok(Self::new(url)),
            None => Err(SinkError::NotEnabled(
                NAME,
                "set discord.webhook_url to enable it".to_string(),
            )),
        }
    }

    async fn read_message(response: reqwest::Response, action: &str) -> Result<DiscordMessage, SinkError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(action, %status, body = %body, "Discord webhook request failed");
            return Err(SinkError::Status {
                service: NAME,
                status,
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MessageApi for DiscordWebhook {
    #[instrument(skip_all, fields(entity_id = %notification.entity_id))]
    async fn create(&self, notification: &Notification) -> Result<String, SinkError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .query(&[("wait", "true")])
            .json(&message(notification))
            .send()
            .await?;

        let created = Self::read_message(response, "create").await?;
        if created.id.is_empty() {
            return Err(SinkError::Api {
                service: NAME,
                message: "webhook response did not include a message id".to_string(),
            });
        }
        debug!(message_id = %created.id, "Created Discord message.");
        Ok(created.id)
    }

    #[instrument(skip_all, fields(entity_id = %notification.entity_id, message_id = %handle))]
    async fn update(&self, handle: &str, notification: &Notification) -> Result<String, SinkError> {
        let response = self
            .client
            .patch(format!("{}/messages/{}", self.webhook_url, handle))
            .json(&message(notification))
            .send()
            .await?;

        let updated = Self::read_message(response, "update").await?;
        debug!(message_id = %updated.id, "Updated Discord message.");
        if updated.id.is_empty() {
            Ok(handle.to_string())
        } else {
            Ok(updated.id)
        }
    }
}

fn message(notification: &Notification) -> DiscordPayload {
    let mut content = format!("nomad {}\n", notification.kind);
    for line in [&notification.title, &notification.headline] {
        if !line.is_empty() {
            content.push_str(line);
            content.push('\n');
        }
    }
    content.push_str(&format!("url: {}\n", notification.title_link));
    content.push_str(&notification.footer);
    content.push('\n');

    DiscordPayload {
        content,
        embeds: notification
            .fields
            .iter()
            .take(MAX_EMBEDS)
            .map(|field| DiscordEmbed {
                title: field.title.clone(),
                description: field.body.clone(),
                color: field.severity.color_rgb(),
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
struct DiscordPayload {
    content: String,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    #[serde(default)]
    id: String,
}
