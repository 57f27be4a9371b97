//! Notification sinks.
//!
//! Every sink follows the same upsert flow: render the snapshot, lock the
//! sink's tracker for that entity kind, then either create a new message and
//! record its handle, or edit the existing message and record whatever handle
//! the edit returned. The channel-specific part is the `MessageApi`, which
//! turns a `Notification` into a request against one external service.

pub mod discord;
pub mod slack;

use crate::config::Config;
use crate::core::{Allocation, Deployment, EntityKind, Sink};
use crate::formatting::{self, Notification, UiLinks};
use crate::tracker::MessageTracker;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info_span, instrument, Instrument, Span};

/// Errors that can occur while building or calling a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink's required configuration is missing. Callers treat this as an
    /// intentional omission rather than a failure.
    #[error("{0} sink is not enabled: {1}")]
    NotEnabled(&'static str, String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The service answered but reported a failure in its payload.
    #[error("{service} API error: {message}")]
    Api {
        service: &'static str,
        message: String,
    },
}

impl SinkError {
    pub fn is_not_enabled(&self) -> bool {
        matches!(self, SinkError::NotEnabled(..))
    }
}

/// Create and edit operations of an external messaging channel.
#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Posts a new message and returns its handle.
    async fn create(&self, notification: &Notification) -> Result<String, SinkError>;

    /// Edits the message identified by `handle` and returns the handle the
    /// service reports for it afterwards.
    async fn update(&self, handle: &str, notification: &Notification) -> Result<String, SinkError>;
}

/// A `Sink` backed by a `MessageApi`, with one tracker per entity kind.
pub struct ChannelSink<A: MessageApi> {
    name: &'static str,
    api: A,
    links: UiLinks,
    /// When set, allocations older than this or already replaced are skipped.
    allocation_max_age: Option<Duration>,
    deployments: MessageTracker,
    allocations: MessageTracker,
    span: Span,
}

impl<A: MessageApi> ChannelSink<A> {
    pub fn new(name: &'static str, api: A, links: UiLinks) -> Self {
        Self {
            name,
            api,
            links,
            allocation_max_age: None,
            deployments: MessageTracker::new(),
            allocations: MessageTracker::new(),
            span: info_span!("sink", sink = name),
        }
    }

    /// Skips allocations that are older than `max_age` or superseded.
    pub fn with_allocation_max_age(mut self, max_age: Duration) -> Self {
        self.allocation_max_age = Some(max_age);
        self
    }

    pub fn tracker(&self, kind: EntityKind) -> &MessageTracker {
        match kind {
            EntityKind::Deployment => &self.deployments,
            EntityKind::Allocation => &self.allocations,
        }
    }

    #[instrument(skip(self, notification))]
    async fn upsert(
        &self,
        kind: EntityKind,
        entity_id: &str,
        notification: Option<Notification>,
    ) -> Result<(), SinkError> {
        let mut handles = self.tracker(kind).lock().await;

        let Some(notification) = notification else {
            debug!(entity_id, "Nothing notification-worthy, skipping.");
            metrics::counter!("notifications_suppressed_total", "sink" => self.name, "kind" => kind.to_string())
                .increment(1);
            return Ok(());
        };

        let result = match handles.lookup(entity_id).map(str::to_owned) {
            None => {
                debug!(entity_id, "No existing message found, creating one.");
                self.api.create(&notification).await.map(|handle| ("create", handle))
            }
            Some(existing) => {
                debug!(entity_id, handle = %existing, "Existing message found, updating it.");
                self.api
                    .update(&existing, &notification)
                    .await
                    .map(|handle| ("update", handle))
            }
        };

        match result {
            Ok((operation, handle)) => {
                debug!(entity_id, operation, handle = %handle, "Recorded message handle.");
                handles.record(entity_id, &handle);
                metrics::counter!("notifications_sent_total", "sink" => self.name, "operation" => operation)
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("notifications_failed_total", "sink" => self.name).increment(1);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<A: MessageApi> Sink for ChannelSink<A> {
    fn name(&self) -> &str {
        self.name
    }

    async fn upsert_deployment(&self, deployment: &Deployment) -> Result<(), SinkError> {
        let notification = formatting::render_deployment(deployment, &self.links, Utc::now());
        self.upsert(EntityKind::Deployment, &deployment.id, Some(notification))
            .instrument(self.span.clone())
            .await
    }

    async fn upsert_allocation(&self, allocation: &Allocation) -> Result<(), SinkError> {
        let now = Utc::now();
        if let Some(max_age) = self.allocation_max_age {
            if formatting::is_stale_or_superseded(allocation, now, max_age) {
                debug!(
                    parent: &self.span,
                    alloc_id = %allocation.id,
                    next_allocation = %allocation.next_allocation,
                    "Allocation is stale or superseded, skipping."
                );
                return Ok(());
            }
        }
        let notification = formatting::render_allocation(allocation, &self.links, now);
        self.upsert(EntityKind::Allocation, &allocation.id, notification)
            .instrument(self.span.clone())
            .await
    }
}

/// The sink variants the notifier knows how to build, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Slack,
    Discord,
}

impl SinkKind {
    pub const ALL: [SinkKind; 2] = [SinkKind::Slack, SinkKind::Discord];

    pub fn name(&self) -> &'static str {
        match self {
            SinkKind::Slack => slack::NAME,
            SinkKind::Discord => discord::NAME,
        }
    }

    /// Builds the sink from configuration. Returns `SinkError::NotEnabled`
    /// when its credentials or destination are not configured.
    pub fn build(&self, config: &Config) -> Result<Arc<dyn Sink>, SinkError> {
        let links = UiLinks::new(config.nomad.ui_base());
        let max_age = Duration::from_secs(config.allocations.max_age_seconds);
        match self {
            SinkKind::Slack => {
                let api = slack::SlackApi::from_config(&config.slack)?;
                Ok(Arc::new(
                    ChannelSink::new(slack::NAME, api, links).with_allocation_max_age(max_age),
                ))
            }
            SinkKind::Discord => {
                let api = discord::DiscordWebhook::from_config(&config.discord)?;
                Ok(Arc::new(
                    ChannelSink::new(discord::NAME, api, links).with_allocation_max_age(max_age),
                ))
            }
        }
    }
}
