// Telemetry topics, event kinds and payload structures
// Published on the TelemetryBus for the coordinating supervisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SessionPhase;

// Topic constants
pub const TOPIC_TASK_COORDINATION: &str = "task-coordination";
pub const TOPIC_CONFLICT_ALERTS: &str = "conflict-alerts";
pub const TOPIC_PERFORMANCE_METRICS: &str = "performance-metrics";

// Event kinds on task-coordination
pub const EVENT_SESSION_STARTED: &str = "session_started";
pub const EVENT_ENVIRONMENT_ANALYZED: &str = "environment_analyzed";
pub const EVENT_PHASE_CHANGED: &str = "phase_changed";
pub const EVENT_SESSION_COMPLETED: &str = "session_completed";

// Event kinds on conflict-alerts
pub const EVENT_AGENT_FAILURE: &str = "agent_failure";
pub const EVENT_CONFLICT_DETECTED: &str = "conflict_detected";
pub const EVENT_CONFLICT_UNRESOLVED: &str = "conflict_unresolved";

// Event kinds on performance-metrics
pub const EVENT_PROGRESS: &str = "progress";

/// One message on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub topic: String,
    pub agent_id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Payload for session started events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedPayload {
    pub branch: String,
    pub task_title: String,
}

/// Payload for phase change events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseChangedPayload {
    pub old_phase: SessionPhase,
    pub new_phase: SessionPhase,
}

/// Payload for progress events after each unit of core work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub unit: usize,
    pub total_units: usize,
    /// completed / total * 100
    pub percentage: f64,
    pub description: String,
    pub files_modified: u64,
    pub tests_run: u64,
}

impl ProgressPayload {
    pub fn percentage_of(completed: usize, total: usize) -> f64 {
        if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        }
    }
}

/// Payload for conflict detected / unresolved events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictAlertPayload {
    pub branch: String,
    pub target_branch: String,
    pub conflicting_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
