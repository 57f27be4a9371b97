//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    consumer::StreamConsumer,
    core::Sink,
    dispatcher::Dispatcher,
    internal_metrics::MetricsBuilder,
    network::{NomadSubscriber, StreamError, Subscriber, Subscription},
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

/// A handle to the running application.
pub struct App {
    consumer: JoinHandle<Result<(), StreamError>>,
    metrics_server: Option<JoinHandle<()>>,
    metrics_addr: Option<SocketAddr>,
    sink_names: Vec<String>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Names of the sinks that were enabled, in dispatch order.
    pub fn sink_names(&self) -> &[String] {
        &self.sink_names
    }

    /// Waits for the stream consumer to finish.
    ///
    /// Returns `Ok` after a clean shutdown. A consumer that could not
    /// subscribe, or whose stream ended, is returned as an error.
    pub async fn run(self) -> Result<()> {
        let result = self.consumer.await.context("stream consumer task panicked")?;

        if let Err(e) = result {
            if let Some(handle) = self.metrics_server {
                handle.abort();
            }
            return Err(anyhow::Error::new(e).context("stream consumer stopped"));
        }

        if let Some(handle) = self.metrics_server {
            if let Err(e) = handle.await {
                error!("Metrics server task panicked: {:?}", e);
            }
        }
        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Sinks and the event subscriber can be overridden, which is how the
/// integration tests run the full pipeline without Nomad, Slack or Discord.
pub struct AppBuilder {
    config: Config,
    sinks_override: Option<Vec<Arc<dyn Sink>>>,
    subscriber_override: Option<Arc<dyn Subscriber>>,
    subscription: Subscription,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sinks_override: None,
            subscriber_override: None,
            subscription: Subscription::default(),
        }
    }

    /// Replaces the sinks built from configuration.
    pub fn sinks_override(mut self, sinks: Vec<Arc<dyn Sink>>) -> Self {
        self.sinks_override = Some(sinks);
        self
    }

    /// Replaces the Nomad HTTP subscriber.
    pub fn subscriber_override(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscriber_override = Some(subscriber);
        self
    }

    pub fn subscription(mut self, subscription: Subscription) -> Self {
        self.subscription = subscription;
        self
    }

    /// Builds the dispatcher and spawns the consumer and the metrics server.
    ///
    /// Fails when no sink is enabled.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;

        let dispatcher = match self.sinks_override {
            Some(sinks) => Dispatcher::new(sinks)?,
            None => Dispatcher::from_config(&config)?,
        };
        let sink_names = dispatcher
            .sink_names()
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        info!(sinks = ?sink_names, "Dispatcher ready.");

        let (metrics_server, metrics_addr) =
            match MetricsBuilder::new(config.metrics_address).build(shutdown_rx.clone()) {
                Some((server, addr)) => {
                    info!(%addr, "Serving Prometheus metrics.");
                    (Some(tokio::spawn(server.run())), Some(addr))
                }
                None => (None, None),
            };

        let subscriber: Arc<dyn Subscriber> = match self.subscriber_override {
            Some(subscriber) => subscriber,
            None => {
                debug!(address = %config.nomad.address, "Initializing Nomad subscriber");
                Arc::new(NomadSubscriber::from_config(&config.nomad))
            }
        };

        let consumer = StreamConsumer::new(Arc::new(dispatcher)).with_subscription(self.subscription);
        let consumer = tokio::spawn(async move { consumer.run(subscriber.as_ref(), shutdown_rx).await });

        Ok(App {
            consumer,
            metrics_server,
            metrics_addr,
            sink_names,
        })
    }
}
