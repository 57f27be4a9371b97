//! The receive loop that turns stream batches into dispatcher calls.

use crate::core::{Allocation, Deployment, Entity};
use crate::dispatcher::Dispatcher;
use crate::network::{Batch, RawEvent, StreamError, Subscriber, Subscription};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, trace, warn, Instrument, Span};

/// Errors decoding the payload of a single event.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{topic} event carries no {field} payload")]
    MissingPayload { topic: String, field: &'static str },

    #[error("invalid {topic} payload: {source}")]
    Invalid {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes the snapshot carried by an event.
///
/// Returns `Ok(None)` for topics the notifier does not handle.
pub fn decode_event(event: &RawEvent) -> Result<Option<Entity>, DecodeError> {
    match event.topic.as_str() {
        "Deployment" => {
            let deployment: Deployment = decode_payload(event, "Deployment")?;
            Ok(Some(Entity::Deployment(Box::new(deployment))))
        }
        "Allocation" => {
            let allocation: Allocation = decode_payload(event, "Allocation")?;
            Ok(Some(Entity::Allocation(Box::new(allocation))))
        }
        _ => Ok(None),
    }
}

fn decode_payload<'a, T: Deserialize<'a>>(event: &'a RawEvent, field: &'static str) -> Result<T, DecodeError> {
    let value = event
        .payload
        .get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| DecodeError::MissingPayload {
            topic: event.topic.clone(),
            field,
        })?;
    T::deserialize(value).map_err(|source| DecodeError::Invalid {
        topic: event.topic.clone(),
        source,
    })
}

/// Consumes one subscription and forwards every decoded snapshot to the
/// dispatcher.
pub struct StreamConsumer {
    dispatcher: Arc<Dispatcher>,
    subscription: Subscription,
    span: Span,
}

impl StreamConsumer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            subscription: Subscription::default(),
            span: info_span!("stream_consumer"),
        }
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscription = subscription;
        self
    }

    /// Subscribes and runs the receive loop until shutdown.
    ///
    /// Failing to subscribe and the stream ending are both returned as errors.
    /// Everything that goes wrong inside the loop is logged and skipped.
    pub async fn run(
        &self,
        subscriber: &dyn Subscriber,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), StreamError> {
        let mut source = subscriber
            .subscribe(&self.subscription)
            .instrument(self.span.clone())
            .await?;
        info!(parent: &self.span, "Stream consumer started.");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let batch = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!(parent: &self.span, "Stream consumer received shutdown signal.");
                    break;
                }
                batch = source.next_batch() => batch,
            };

            match batch {
                None => {
                    warn!(parent: &self.span, "Event stream ended.");
                    return Err(StreamError::Ended);
                }
                Some(Batch::Error(e)) => {
                    warn!(parent: &self.span, error = %e, "Error from event stream.");
                }
                Some(Batch::Heartbeat) => {
                    trace!(parent: &self.span, "Heartbeat.");
                }
                Some(Batch::Events(events)) => {
                    self.handle_events(&events).instrument(self.span.clone()).await;
                }
            }
        }

        info!(parent: &self.span, "Stream consumer finished.");
        Ok(())
    }

    async fn handle_events(&self, events: &[RawEvent]) {
        for event in events {
            metrics::counter!("events_received_total", "topic" => event.topic.clone()).increment(1);
            debug!(topic = %event.topic, event_type = %event.event_type, key = %event.key, index = event.index, "Received event.");

            let entity = match decode_event(event) {
                Ok(Some(entity)) => entity,
                Ok(None) => {
                    debug!(topic = %event.topic, "Ignoring event from unhandled topic.");
                    continue;
                }
                Err(e) => {
                    metrics::counter!("events_decode_failures_total").increment(1);
                    error!(topic = %event.topic, key = %event.key, error = %e, "Failed to decode event payload.");
                    continue;
                }
            };

            let result = match &entity {
                Entity::Deployment(deployment) => self.dispatcher.upsert_deployment(deployment).await,
                Entity::Allocation(allocation) => self.dispatcher.upsert_allocation(allocation).await,
            };
            if let Err(failures) = result {
                warn!(
                    kind = %entity.kind(),
                    id = entity.id(),
                    error = %failures,
                    "Failed to upsert notification."
                );
            }
        }
    }
}
