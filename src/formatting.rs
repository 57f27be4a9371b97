// src/formatting.rs

use crate::core::{Allocation, Deployment, EntityKind, TaskEvent};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Status description Nomad reports when a canary deployment waits for an
/// operator to promote it.
pub const MANUAL_PROMOTION_REQUIRED: &str = "Deployment is running but requires manual promotion";

/// Substring of a task event's display message that signals an OOM kill.
const OOM_MARKER: &str = "OOM";

const EVENT_TERMINATED: &str = "Terminated";
const EVENT_KILLED: &str = "Killed";
const TERMINATED_DETAILS: [&str; 2] = ["exit_code", "signal"];
const KILLED_DETAILS: [&str; 3] = ["kill_reason", "kill_error", "kill_timeout"];

const FIELD_SEPARATOR: &str = "---------------------------------------------";

/// Severity of a notification, derived from a Nomad status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Failed,
    Running,
    Successful,
    Unknown,
}

impl Severity {
    pub fn from_status(status: &str) -> Self {
        match status {
            "failed" => Severity::Failed,
            "running" => Severity::Running,
            "successful" => Severity::Successful,
            _ => Severity::Unknown,
        }
    }

    /// Returns a color hex code for the severity.
    pub fn color_hex(&self) -> &'static str {
        match self {
            Severity::Failed => "#dd4e58",     // Red
            Severity::Running => "#1daeff",    // Blue
            Severity::Successful => "#36a64f", // Green
            Severity::Unknown => "#D3D3D3",    // Gray
        }
    }

    /// The same color as a 24-bit integer.
    pub fn color_rgb(&self) -> u32 {
        match self {
            Severity::Failed => 0xdd4e58,
            Severity::Running => 0x1daeff,
            Severity::Successful => 0x36a64f,
            Severity::Unknown => 0xd3d3d3,
        }
    }
}

/// One titled block of a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub title: String,
    pub text: String,
    pub ok_text: String,
    pub dismiss_text: String,
}

/// A button offered alongside a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub text: String,
    pub danger: bool,
    pub confirm: Option<Confirmation>,
}

/// A sink-agnostic rendering of an entity snapshot.
///
/// Built fresh for every upsert and never stored; each sink translates it into
/// its own wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: EntityKind,
    pub entity_id: String,
    /// e.g. "web deployment update"
    pub headline: String,
    pub headline_link: String,
    pub title: String,
    pub title_link: String,
    pub fields: Vec<Field>,
    pub severity: Severity,
    pub actions: Vec<Action>,
    pub footer: String,
    /// Unix seconds at render time.
    pub timestamp: i64,
}

/// Builds deep links back into the Nomad web UI.
#[derive(Debug, Clone, PartialEq)]
pub struct UiLinks {
    base: String,
}

impl UiLinks {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn job_deployments(&self, job_id: &str) -> String {
        format!("{}/ui/jobs/{}/deployments", self.base, job_id)
    }

    pub fn allocation(&self, alloc_id: &str) -> String {
        format!("{}/ui/allocations/{}", self.base, alloc_id)
    }

    pub fn task_group(&self, job_id: &str, task_group: &str) -> String {
        format!("{}/ui/jobs/{}/{}", self.base, job_id, task_group)
    }
}

fn footer(label: &str, id: &str) -> String {
    format!(
        "nomad-notifier: {} | {}: {}",
        env!("CARGO_PKG_VERSION"),
        label,
        id
    )
}

fn promotion_actions() -> Vec<Action> {
    vec![
        Action {
            name: "promote".to_string(),
            text: "Promote :heavy_check_mark:".to_string(),
            danger: false,
            confirm: None,
        },
        Action {
            name: "fail".to_string(),
            text: "Fail :boom:".to_string(),
            danger: true,
            confirm: Some(Confirmation {
                title: "Are you sure?".to_string(),
                text: "This marks the deployment as failed.".to_string(),
                ok_text: "Fail".to_string(),
                dismiss_text: "Woops!".to_string(),
            }),
        },
    ]
}

/// Renders a deployment snapshot. Deployments are always notification-worthy.
pub fn render_deployment(deployment: &Deployment, links: &UiLinks, now: DateTime<Utc>) -> Notification {
    let severity = Severity::from_status(&deployment.status);

    let fields = deployment
        .task_groups
        .iter()
        .map(|(name, tg)| Field {
            title: format!("Task Group: {}", name),
            body: format!(
                "Desired: {}, Placed: {}, Healthy: {}, Unhealthy: {}, DesiredCanaries: {}, PlacedCanaries: {}",
                tg.desired_total,
                tg.placed_allocs,
                tg.healthy_allocs,
                tg.unhealthy_allocs,
                tg.desired_canaries,
                tg.placed_canaries.len()
            ),
            severity,
        })
        .collect();

    let actions = if deployment.status_description == MANUAL_PROMOTION_REQUIRED {
        promotion_actions()
    } else {
        Vec::new()
    };

    let link = links.job_deployments(&deployment.job_id);
    Notification {
        kind: EntityKind::Deployment,
        entity_id: deployment.id.clone(),
        headline: format!("{} deployment update", deployment.job_id),
        headline_link: link.clone(),
        title: deployment.status_description.clone(),
        title_link: link,
        fields,
        severity,
        actions,
        footer: footer("Deploy ID", &deployment.id),
        timestamp: now.timestamp(),
    }
}

/// Renders an allocation snapshot.
///
/// Only task states with at least one OOM event produce a field. Returns
/// `None` when no field remains, meaning nothing should be sent.
pub fn render_allocation(
    allocation: &Allocation,
    links: &UiLinks,
    now: DateTime<Utc>,
) -> Option<Notification> {
    let severity = Severity::from_status(&allocation.client_status);

    let fields: Vec<Field> = allocation
        .task_states
        .iter()
        .filter(|(_, state)| {
            state
                .events
                .iter()
                .any(|event| event.display_message.contains(OOM_MARKER))
        })
        .map(|(task, state)| {
            let mut body = format!("{}\n", FIELD_SEPARATOR);
            for event in &state.events {
                body.push_str(&event_line(event));
                body.push('\n');
            }
            Field {
                title: format!(
                    "taskState:{} Failed: {}, Restarts: {} Task Group: {} Task: {}",
                    state.state, state.failed, state.restarts, allocation.task_group, task
                ),
                body,
                severity,
            }
        })
        .collect();

    if fields.is_empty() {
        return None;
    }

    Some(Notification {
        kind: EntityKind::Allocation,
        entity_id: allocation.id.clone(),
        headline: format!("{} allocation update", allocation.id),
        headline_link: links.allocation(&allocation.id),
        title: allocation.client_description.clone(),
        title_link: links.task_group(&allocation.job_id, &allocation.task_group),
        fields,
        severity,
        actions: Vec::new(),
        footer: footer("Allocation ID", &allocation.id),
        timestamp: now.timestamp(),
    })
}

fn event_line(event: &TaskEvent) -> String {
    let mut line = format!("*{}*: {}", event.event_type, event.display_message);
    if let Some(driver_message) = event.detail("driver_message") {
        line.push(' ');
        line.push_str(driver_message);
    }

    let keys: &[&str] = match event.event_type.as_str() {
        EVENT_TERMINATED => &TERMINATED_DETAILS,
        EVENT_KILLED => &KILLED_DETAILS,
        _ => &[],
    };
    for key in keys {
        if let Some(value) = event.detail(key) {
            line.push_str(&format!(", {}: {}", key, value));
        }
    }
    line
}

/// Checks whether an allocation should no longer be announced: it was last
/// modified more than `max_age` ago, or a successor allocation replaced it.
pub fn is_stale_or_superseded(allocation: &Allocation, now: DateTime<Utc>, max_age: Duration) -> bool {
    if !allocation.next_allocation.is_empty() {
        return true;
    }
    let modified = DateTime::<Utc>::from_timestamp_nanos(allocation.modify_time);
    let age_seconds = now.signed_duration_since(modified).num_seconds();
    age_seconds > i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX)
}
