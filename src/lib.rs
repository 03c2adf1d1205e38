// Clippy allows for reasonable defaults
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer

// Module declarations
pub mod batch;
pub mod config;
pub mod error;
pub mod git;
pub mod models;
pub mod orchestrator;
pub mod quality;
pub mod resolver;
pub mod session;
pub mod shutdown;
pub mod storage;
pub mod telemetry;
pub mod templates;
pub mod utils;
pub mod work;

// Re-export the types most callers need
pub use config::{BranchworkConfig, ConfigManager, PartialConfig};
pub use error::{ErrorKind, GitError, OrchestratorError, SessionError};
pub use models::*;
pub use orchestrator::{Orchestrator, SessionHandle};
pub use session::{AgentSession, CancellationFlag, SessionSettings, Workspace};
pub use telemetry::{TelemetryBus, TelemetryEvent};
