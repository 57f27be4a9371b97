//! Core domain types and service traits for the notifier
//!
//! This module defines the entity snapshots decoded from the Nomad event
//! stream and the trait contract every notification sink implements.

use crate::notification::SinkError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Nomad serializes empty maps and slices as `null`; treat those as empty.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The two entity kinds the notifier tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Deployment,
    Allocation,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Deployment => write!(f, "deployment"),
            EntityKind::Allocation => write!(f, "allocation"),
        }
    }
}

/// A full snapshot of a Nomad deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Deployment {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "JobID", default)]
    pub job_id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_description: String,
    /// Unix nanoseconds.
    #[serde(default)]
    pub modify_time: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub task_groups: BTreeMap<String, DeploymentState>,
}

/// Rollout progress of a single task group within a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentState {
    #[serde(default)]
    pub desired_total: u32,
    #[serde(default)]
    pub placed_allocs: u32,
    #[serde(default)]
    pub healthy_allocs: u32,
    #[serde(default)]
    pub unhealthy_allocs: u32,
    #[serde(default)]
    pub desired_canaries: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub placed_canaries: Vec<String>,
    #[serde(default)]
    pub promoted: bool,
}

/// A full snapshot of a Nomad allocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "JobID", default)]
    pub job_id: String,
    #[serde(default)]
    pub task_group: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub client_status: String,
    #[serde(default)]
    pub client_description: String,
    #[serde(default)]
    pub desired_status: String,
    /// ID of the allocation that replaced this one, empty while it is current.
    #[serde(default)]
    pub next_allocation: String,
    /// Unix nanoseconds.
    #[serde(default)]
    pub modify_time: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub task_states: BTreeMap<String, TaskState>,
}

/// The state of one task inside an allocation, with its event history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub restarts: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub events: Vec<TaskEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TaskEvent {
    #[serde(rename = "Type", default)]
    pub event_type: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub display_message: String,
    #[serde(default, deserialize_with = "nullable")]
    pub details: BTreeMap<String, String>,
}

impl TaskEvent {
    /// Returns a detail value only when it is present and non-empty.
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// A decoded entity snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Deployment(Box<Deployment>),
    Allocation(Box<Allocation>),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Deployment(deployment) => &deployment.id,
            Entity::Allocation(allocation) => &allocation.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Deployment(_) => EntityKind::Deployment,
            Entity::Allocation(_) => EntityKind::Allocation,
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// An external channel that can create messages and later edit them.
#[async_trait]
pub trait Sink: Send + Sync {
    /// A unique, descriptive name for the sink (e.g., "slack", "discord").
    /// Used for logging, metrics and failure reports.
    fn name(&self) -> &str;

    /// Creates or edits the message announcing this deployment.
    async fn upsert_deployment(&self, deployment: &Deployment) -> Result<(), SinkError>;

    /// Creates or edits the message announcing this allocation, if it is
    /// notification-worthy.
    async fn upsert_allocation(&self, allocation: &Allocation) -> Result<(), SinkError>;
}
