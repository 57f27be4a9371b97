//! A client for posting and editing notifications through the Slack Web API.

use super::{MessageApi, SinkError};
use crate::config::SlackConfig;
use crate::core::EntityKind;
use crate::formatting::{Action, Notification};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

pub const NAME: &str = "slack";

/// Posts messages with `chat.postMessage` and edits them with `chat.update`.
/// The message handle is the `ts` Slack assigns to the message.
pub struct SlackApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
    channel: String,
}

impl std::fmt::Debug for SlackApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackApi")
            .field("api_url", &self.api_url)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl SlackApi {
    /// Creates a new `SlackApi`.
    pub fn new(api_url: impl Into<String>, token: impl Into<String>, channel: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.into(),
            channel: channel.into(),
        }
    }

    /// Builds the client, or `SinkError::NotEnabled` when the token or the
    /// channel is missing.
    pub fn from_config(config: &SlackConfig) -> Result<Self, SinkError> {
        let token = config.token.as_deref().filter(|t| !t.is_empty());
        let channel = config.channel.as_deref().filter(|c| !c.is_empty());
        match (token, channel) {
            (Some(token), Some(channel)) => Ok(Self::new(&config.api_url, token, channel)),
            _ => Err(SinkError::NotEnabled(
                NAME,
                "set slack.token and slack.channel to enable it".to_string(),
            )),
        }
    }

    fn message(&self, notification: &Notification, ts: Option<&str>) -> SlackMessage {
        SlackMessage {
            channel: self.channel.clone(),
            ts: ts.map(str::to_owned),
            as_user: true,
            attachments: vec![attachment(notification)],
        }
    }

    /// Calls a Web API method and returns the `ts` of the affected message.
    async fn call(&self, method: &str, message: &SlackMessage) -> Result<String, SinkError> {
        let response = self
            .client
            .post(format!("{}/{}", self.api_url, method))
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(method, %status, body = %body, "Slack request failed");
            return Err(SinkError::Status {
                service: NAME,
                status,
                body,
            });
        }

        // Slack reports most failures with a 200 and `ok: false`.
        let reply: SlackReply = response.json().await?;
        match reply {
            SlackReply { ok: true, ts: Some(ts), .. } => Ok(ts),
            SlackReply { ok: true, ts: None, .. } => Err(SinkError::Api {
                service: NAME,
                message: format!("{} response did not include a message ts", method),
            }),
            SlackReply { error, .. } => Err(SinkError::Api {
                service: NAME,
                message: error.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

#[async_trait]
impl MessageApi for SlackApi {
    #[instrument(skip_all, fields(entity_id = %notification.entity_id))]
    async fn create(&self, notification: &Notification) -> Result<String, SinkError> {
        let ts = self
            .call("chat.postMessage", &self.message(notification, None))
            .await?;
        debug!(ts = %ts, "Posted Slack message.");
        Ok(ts)
    }

    #[instrument(skip_all, fields(entity_id = %notification.entity_id, ts = %handle))]
    async fn update(&self, handle: &str, notification: &Notification) -> Result<String, SinkError> {
        let ts = self
            .call("chat.update", &self.message(notification, Some(handle)))
            .await?;
        debug!(ts = %ts, "Updated Slack message.");
        Ok(ts)
    }
}

fn attachment(notification: &Notification) -> SlackAttachment {
    let fallback = match notification.kind {
        EntityKind::Deployment => "deployment update",
        EntityKind::Allocation => "allocation update",
    };

    SlackAttachment {
        fallback: fallback.to_string(),
        color: notification.severity.color_hex().to_string(),
        author_name: notification.headline.clone(),
        author_link: notification.headline_link.clone(),
        title: notification.title.clone(),
        title_link: notification.title_link.clone(),
        fields: notification
            .fields
            .iter()
            .map(|field| SlackField {
                title: field.title.clone(),
                value: field.body.clone(),
                short: false,
            })
            .collect(),
        footer: notification.footer.clone(),
        ts: notification.timestamp,
        callback_id: (!notification.actions.is_empty()).then(|| notification.entity_id.clone()),
        actions: notification.actions.iter().map(action).collect(),
    }
}

fn action(action: &Action) -> SlackAction {
    SlackAction {
        name: action.name.clone(),
        text: action.text.clone(),
        action_type: "button",
        style: action.danger.then_some("danger"),
        confirm: action.confirm.as_ref().map(|confirm| SlackConfirm {
            title: confirm.title.clone(),
            text: confirm.text.clone(),
            ok_text: confirm.ok_text.clone(),
            dismiss_text: confirm.dismiss_text.clone(),
        }),
    }
}

/// `chat.postMessage` / `chat.update` request body.
#[derive(Debug, Serialize)]
struct SlackMessage {
    channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<String>,
    as_user: bool,
    attachments: Vec<SlackAttachment>,
}

/// Slack attachment.
#[derive(Debug, Serialize)]
struct SlackAttachment {
    fallback: String,
    color: String,
    author_name: String,
    author_link: String,
    title: String,
    title_link: String,
    fields: Vec<SlackField>,
    footer: String,
    ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    actions: Vec<SlackAction>,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

#[derive(Debug, Serialize)]
struct SlackAction {
    name: String,
    text: String,
    #[serde(rename = "type")]
    action_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confirm: Option<SlackConfirm>,
}

#[derive(Debug, Serialize)]
struct SlackConfirm {
    title: String,
    text: String,
    ok_text: String,
    dismiss_text: String,
}

#[derive(Debug, Deserialize)]
struct SlackReply {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
