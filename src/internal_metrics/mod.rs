//! # Internal Metrics
//!
//! Counters are recorded with the `metrics` macros where the events happen:
//!
//! - `events_received_total{topic}`: events read from the Nomad stream.
//! - `events_decode_failures_total`: events whose payload could not be decoded.
//! - `notifications_sent_total{sink,operation}`: successful creates and updates.
//! - `notifications_failed_total{sink}`: failed creates and updates.
//! - `notifications_suppressed_total{sink,kind}`: snapshots that were not
//!   notification-worthy.
//!
//! Without a listen address no recorder is installed and the macros are no-ops.
//! With one, `MetricsBuilder` installs a Prometheus recorder and hands back a
//! `MetricsServer` for the caller to spawn.

pub mod server;

use crate::internal_metrics::server::MetricsServer;
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

/// Registers descriptions for every metric the notifier records.
pub fn describe_metrics() {
    metrics::describe_counter!("events_received_total", Unit::Count, "Total number of events received from the Nomad event stream, labeled by topic.");
    metrics::describe_counter!("events_decode_failures_total", Unit::Count, "Total number of events whose payload could not be decoded.");
    metrics::describe_counter!("notifications_sent_total", Unit::Count, "Total number of messages created or updated, labeled by sink and operation.");
    metrics::describe_counter!("notifications_failed_total", Unit::Count, "Total number of failed create or update calls, labeled by sink.");
    metrics::describe_counter!("notifications_suppressed_total", Unit::Count, "Total number of snapshots that produced no notification, labeled by sink and kind.");
}

/// Builder for the Prometheus exporter.
pub struct MetricsBuilder {
    listen_address: Option<SocketAddr>,
}

impl MetricsBuilder {
    pub fn new(listen_address: Option<SocketAddr>) -> Self {
        Self { listen_address }
    }

    /// Installs the global Prometheus recorder and binds the scrape listener.
    ///
    /// Returns `None` when no address is configured or when setup fails; the
    /// failure is logged and the notifier runs without an exporter.
    pub fn build(self, shutdown_rx: watch::Receiver<bool>) -> Option<(MetricsServer, SocketAddr)> {
        let listen_address = self.listen_address?;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        // Bind first so an unusable address leaves the no-op recorder in place.
        let listener = match std::net::TcpListener::bind(listen_address) {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server to {}: {}", listen_address, e);
                return None;
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return None;
            }
        };

        let listener = match listener
            .set_nonblocking(true)
            .and_then(|()| TcpListener::from_std(listener))
        {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to register metrics listener with the runtime: {}", e);
                return None;
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return None;
        }
        describe_metrics();

        Some((MetricsServer::new(listener, handle, shutdown_rx), addr))
    }
}
