#![allow(dead_code)]
use async_trait::async_trait;
use nomad_notifier::network::{Batch, EventSource, RawEvent, StreamError, Subscriber, Subscription};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A subscriber whose single stream is fed by the test through a channel.
/// Dropping the sender ends the stream.
pub struct ScriptedSubscriber {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Batch>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ScriptedSubscriber {
    pub fn new() -> (Self, BatchSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Self {
            rx: Mutex::new(Some(rx)),
            subscriptions: Mutex::new(Vec::new()),
        };
        (subscriber, BatchSender { tx })
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Subscriber for ScriptedSubscriber {
    async fn subscribe(&self, subscription: &Subscription) -> Result<Box<dyn EventSource>, StreamError> {
        self.subscriptions.lock().unwrap().push(subscription.clone());
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("ScriptedSubscriber only supports one subscription");
        Ok(Box::new(ChannelEventSource { rx }))
    }
}

struct ChannelEventSource {
    rx: mpsc::UnboundedReceiver<Batch>,
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn next_batch(&mut self) -> Option<Batch> {
        self.rx.recv().await
    }
}

/// The test's end of a `ScriptedSubscriber`.
pub struct BatchSender {
    tx: mpsc::UnboundedSender<Batch>,
}

impl BatchSender {
    pub fn events(&self, events: Vec<RawEvent>) {
        self.tx.send(Batch::Events(events)).unwrap();
    }

    pub fn heartbeat(&self) {
        self.tx.send(Batch::Heartbeat).unwrap();
    }

    pub fn error(&self, message: &str) {
        self.tx
            .send(Batch::Error(StreamError::Server(message.to_string())))
            .unwrap();
    }
}

/// A subscriber that the agent always refuses.
pub struct RefusingSubscriber;

#[async_trait]
impl Subscriber for RefusingSubscriber {
    async fn subscribe(&self, _subscription: &Subscription) -> Result<Box<dyn EventSource>, StreamError> {
        Err(StreamError::Status {
            status: reqwest::StatusCode::FORBIDDEN,
            body: "Permission denied".to_string(),
        })
    }
}
