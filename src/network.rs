//! Client for the Nomad event stream
//!
//! This module opens `/v1/event/stream`, splits the newline-delimited JSON
//! body into frames and turns each frame into a `Batch`. The `Subscriber` and
//! `EventSource` traits let tests replace the HTTP stream with scripted data.

use crate::config::NomadConfig;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Starting from this index makes Nomad begin at the newest event, so a
/// restart does not replay history.
pub const LATEST_INDEX: i64 = i64::MAX;

/// Errors raised by the event stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to connect to the Nomad event stream: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("Nomad event stream returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("event stream transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("malformed event stream frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("event stream reported an error: {0}")]
    Server(String),

    #[error("event stream ended")]
    Ended,
}

/// A single event as delivered by Nomad. The payload is decoded later, by topic.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RawEvent {
    pub topic: String,
    #[serde(rename = "Type", default)]
    pub event_type: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub index: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One frame of the stream.
#[derive(Debug)]
pub enum Batch {
    Error(StreamError),
    Heartbeat,
    Events(Vec<RawEvent>),
}

/// Parses one NDJSON line into a `Batch`.
///
/// Nomad sends `{}` as a heartbeat. A frame carrying an `Err` is an error
/// batch, as is a line that is not valid JSON.
pub fn parse_batch(line: &str) -> Batch {
    #[derive(Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Frame {
        #[serde(default)]
        events: Option<Vec<RawEvent>>,
        #[serde(default, alias = "Error")]
        err: Option<String>,
    }

    let frame: Frame = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(e) => return Batch::Error(StreamError::Malformed(e)),
    };

    if let Some(err) = frame.err.filter(|err| !err.is_empty()) {
        return Batch::Error(StreamError::Server(err));
    }

    match frame.events {
        Some(events) if !events.is_empty() => Batch::Events(events),
        _ => Batch::Heartbeat,
    }
}

/// Topics and starting index of a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Topic name and key filter pairs, sent as `topic=Name:filter`.
    pub topics: Vec<(String, String)>,
    pub start_index: i64,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            topics: vec![
                ("Deployment".to_string(), "*".to_string()),
                ("Allocation".to_string(), "*".to_string()),
            ],
            start_index: LATEST_INDEX,
        }
    }
}

impl Subscription {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query: Vec<(&'static str, String)> = self
            .topics
            .iter()
            .map(|(topic, filter)| ("topic", format!("{}:{}", topic, filter)))
            .collect();
        query.push(("index", self.start_index.to_string()));
        query
    }
}

/// Opens event streams.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(&self, subscription: &Subscription) -> Result<Box<dyn EventSource>, StreamError>;
}

/// An open event stream.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next batch. `None` once the stream has ended.
    async fn next_batch(&mut self) -> Option<Batch>;
}

/// Subscribes to the event stream of a Nomad agent over HTTP.
pub struct NomadSubscriber {
    client: reqwest::Client,
    address: String,
    token: Option<String>,
}

impl NomadSubscriber {
    pub fn new(address: impl Into<String>, token: Option<String>) -> Self {
        let address: String = address.into();
        Self {
            client: reqwest::Client::new(),
            address: address.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn from_config(config: &NomadConfig) -> Self {
        Self::new(&config.address, config.token.clone())
    }
}

#[async_trait]
impl Subscriber for NomadSubscriber {
    #[instrument(skip_all, fields(address = %self.address))]
    async fn subscribe(&self, subscription: &Subscription) -> Result<Box<dyn EventSource>, StreamError> {
        let mut request = self
            .client
            .get(format!("{}/v1/event/stream", self.address))
            .query(&subscription.query());
        if let Some(token) = &self.token {
            request = request.header("X-Nomad-Token", token);
        }

        let response = request.send().await.map_err(StreamError::Connect)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Status { status, body });
        }

        info!(topics = ?subscription.topics, "Subscribed to the Nomad event stream.");
        Ok(Box::new(NdjsonEventSource::new(response)))
    }
}

/// Splits a chunked HTTP body into newline-delimited frames.
pub struct NdjsonEventSource {
    response: reqwest::Response,
    buffer: Vec<u8>,
    finished: bool,
}

impl NdjsonEventSource {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: Vec::new(),
            finished: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[async_trait]
impl EventSource for NdjsonEventSource {
    async fn next_batch(&mut self) -> Option<Batch> {
        loop {
            while let Some(line) = self.take_line() {
                if !line.is_empty() {
                    return Some(parse_batch(&line));
                }
            }

            if self.finished {
                let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
                self.buffer.clear();
                return (!rest.is_empty()).then(|| parse_batch(&rest));
            }

            match self.response.chunk().await {
                Ok(Some(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(None) => {
                    debug!("Event stream body finished.");
                    self.finished = true;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Batch::Error(StreamError::Transport(e)));
                }
            }
        }
    }
}
