// Data models for agents, tasks and the records a session produces

mod metrics;
mod records;
pub mod state_machine;

pub use metrics::PerformanceMetrics;
pub use records::{
    ConflictReport, EnvironmentReport, FailureReport, MergeRequestArtifact, QualitySummary,
    SessionOutcome, Snapshot,
};
pub use state_machine::SessionPhase;

use serde::{Deserialize, Serialize};

fn default_agent_type() -> String {
    "feat".to_string()
}

fn default_priority() -> u8 {
    3
}

/// Task descriptor supplied by the caller.
///
/// The orchestrator never interprets `description`; it is handed to the
/// task's core work and echoed into the merge request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Conventional-commit type used for the commit subject
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    /// 1 (lowest) to 5 (highest)
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub estimated_duration: Option<String>,
}

impl AgentTask {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            description: String::new(),
            agent_type: default_agent_type(),
            priority: default_priority(),
            estimated_duration: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_agent_type(mut self, agent_type: &str) -> Self {
        self.agent_type = agent_type.to_string();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 5);
        self
    }
}

/// Identity of one agent for the lifetime of its session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub agent_id: String,
    pub branch_name: String,
    pub task: AgentTask,
}

impl Agent {
    pub fn new(agent_id: &str, branch_name: &str, task: AgentTask) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            branch_name: branch_name.to_string(),
            task,
        }
    }

    /// Generate a fresh agent id
    pub fn generate_id() -> String {
        format!("agent-{}", uuid::Uuid::new_v4())
    }
}
