#![allow(dead_code)]
pub mod fake_source;

use nomad_notifier::network::RawEvent;
use serde_json::json;

/// Current time as a Nomad `ModifyTime`, in nanoseconds.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap()
}

pub fn deployment_event(id: &str, description: &str) -> RawEvent {
    RawEvent {
        topic: "Deployment".to_string(),
        event_type: "DeploymentStatusUpdate".to_string(),
        key: id.to_string(),
        index: 100,
        payload: json!({
            "Deployment": {
                "ID": id,
                "JobID": "api",
                "Namespace": "default",
                "Status": "running",
                "StatusDescription": description,
                "ModifyTime": now_nanos(),
                "TaskGroups": {
                    "web": {
                        "DesiredTotal": 3,
                        "PlacedAllocs": 3,
                        "HealthyAllocs": 2,
                        "UnhealthyAllocs": 0,
                        "DesiredCanaries": 1,
                        "PlacedCanaries": ["c-1"],
                        "Promoted": false
                    }
                }
            }
        }),
    }
}

/// An allocation whose `nginx` task was OOM killed with exit code 137, next to
/// a healthy `sidecar` task.
pub fn oom_allocation_event(id: &str) -> RawEvent {
    RawEvent {
        topic: "Allocation".to_string(),
        event_type: "AllocationUpdated".to_string(),
        key: id.to_string(),
        index: 101,
        payload: json!({
            "Allocation": {
                "ID": id,
                "JobID": "api",
                "TaskGroup": "web",
                "Namespace": "default",
                "ClientStatus": "running",
                "ClientDescription": "Tasks are running",
                "DesiredStatus": "run",
                "NextAllocation": "",
                "ModifyTime": now_nanos(),
                "TaskStates": {
                    "nginx": {
                        "State": "running",
                        "Failed": false,
                        "Restarts": 1,
                        "Events": [{
                            "Type": "Terminated",
                            "Time": now_nanos(),
                            "DisplayMessage": "Killed: OOM",
                            "Details": {"exit_code": "137", "signal": "", "oom_killed": "true"}
                        }]
                    },
                    "sidecar": {
                        "State": "running",
                        "Failed": false,
                        "Restarts": 0,
                        "Events": [{
                            "Type": "Started",
                            "Time": now_nanos(),
                            "DisplayMessage": "Task started by client",
                            "Details": null
                        }]
                    }
                }
            }
        }),
    }
}
