// Task files read by the command line

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::models::AgentTask;

/// One session requested by a batch file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    #[serde(default)]
    pub agent_id: Option<String>,
    pub branch: String,
    pub task: AgentTask,
    /// Shell steps run as the session's core work
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchFile {
    pub tasks: Vec<BatchEntry>,
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// Resolve a `--task` argument.
///
/// Accepts a path to a YAML/JSON task file, an inline YAML/JSON task, or a
/// bare title.
pub fn parse_task_arg(arg: &str) -> Result<AgentTask, ConfigError> {
    let path = Path::new(arg);
    if path.is_file() {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: arg.to_string(),
            source: e,
        })?;
        return serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: arg.to_string(),
            message: e.to_string(),
        });
    }

    match serde_yaml::from_str::<serde_yaml::Value>(arg) {
        Ok(value @ serde_yaml::Value::Mapping(_)) => {
            serde_yaml::from_value(value).map_err(|e| ConfigError::Parse {
                path: "--task".to_string(),
                message: e.to_string(),
            })
        }
        _ => Ok(AgentTask::new(arg.trim())),
    }
}
