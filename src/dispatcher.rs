//! Fan-out of entity snapshots to every enabled sink.

use crate::config::Config;
use crate::core::{Allocation, Deployment, Sink};
use crate::notification::{SinkError, SinkKind};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, instrument, warn, Span};

/// Errors that prevent the dispatcher from being constructed.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no notification sinks are enabled; configure Slack or Discord")]
    NoSinksEnabled,

    #[error("failed to build the {sink} sink: {source}")]
    Build {
        sink: &'static str,
        #[source]
        source: SinkError,
    },
}

/// One sink's failure during a dispatch.
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: String,
    pub error: SinkError,
}

/// The failures of a single dispatch. Never empty.
#[derive(Debug)]
pub struct DispatchFailures(Vec<SinkFailure>);

impl DispatchFailures {
    pub fn failures(&self) -> &[SinkFailure] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<SinkFailure> {
        self.0
    }
}

impl fmt::Display for DispatchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|failure| format!("{}: {}", failure.sink, failure.error))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for DispatchFailures {}

/// Calls every sink in a fixed order. One sink failing never stops the rest.
pub struct Dispatcher {
    sinks: Vec<Arc<dyn Sink>>,
    span: Span,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Result<Self, DispatchError> {
        if sinks.is_empty() {
            return Err(DispatchError::NoSinksEnabled);
        }
        Ok(Self {
            sinks,
            span: info_span!("dispatcher"),
        })
    }

    /// Builds every sink that has its configuration present.
    pub fn from_config(config: &Config) -> Result<Self, DispatchError> {
        let sinks = SinkKind::ALL
            .iter()
            .try_fold(Vec::new(), |mut sinks, kind| match kind.build(config) {
                Ok(sink) => {
                    info!(sink = kind.name(), "Sink enabled.");
                    sinks.push(sink);
                    Ok(sinks)
                }
                Err(e) if e.is_not_enabled() => {
                    info!(sink = kind.name(), reason = %e, "Sink disabled.");
                    Ok(sinks)
                }
                Err(source) => Err(DispatchError::Build {
                    sink: kind.name(),
                    source,
                }),
            })?;
        Self::new(sinks)
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    #[instrument(parent = &self.span, skip_all, fields(deploy_id = %deployment.id))]
    pub async fn upsert_deployment(&self, deployment: &Deployment) -> Result<(), DispatchFailures> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(error) = sink.upsert_deployment(deployment).await {
                warn!(sink = sink.name(), error = %error, "Failed to upsert deployment.");
                failures.push(SinkFailure {
                    sink: sink.name().to_string(),
                    error,
                });
            }
        }
        finish(failures)
    }

    #[instrument(parent = &self.span, skip_all, fields(alloc_id = %allocation.id))]
    pub async fn upsert_allocation(&self, allocation: &Allocation) -> Result<(), DispatchFailures> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(error) = sink.upsert_allocation(allocation).await {
                warn!(sink = sink.name(), error = %error, "Failed to upsert allocation.");
                failures.push(SinkFailure {
                    sink: sink.name().to_string(),
                    error,
                });
            }
        }
        finish(failures)
    }
}

fn finish(failures: Vec<SinkFailure>) -> Result<(), DispatchFailures> {
    if failures.is_empty() {
        Ok(())
    } else {
        debug!(failed = failures.len(), "Dispatch finished with failures.");
        Err(DispatchFailures(failures))
    }
}
