//! Error types shared across the orchestrator
//!
//! Errors are grouped by the seam that raises them. Session errors carry an
//! [`ErrorKind`] that ends up in the persisted failure report.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::state_machine::{SessionPhase, StateTransitionError};

/// Errors raised by a version-control backend
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to open repository at {path}: {message}")]
    Open { path: String, message: String },

    #[error("Failed to checkout branch '{branch}': {message}")]
    Checkout { branch: String, message: String },

    #[error("Failed to fetch '{target}': {message}")]
    Fetch { target: String, message: String },

    #[error("Failed to diff: {0}")]
    Diff(String),

    #[error("Failed to commit: {0}")]
    Commit(String),

    #[error("Worktree operation failed: {0}")]
    Worktree(String),
}

/// Kind of a fatal session failure, as recorded in a failure report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "BranchConflictError")]
    BranchConflict,
    #[serde(rename = "CheckoutError")]
    Checkout,
    #[serde(rename = "SnapshotError")]
    Snapshot,
    #[serde(rename = "CoreWorkError")]
    CoreWork,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "CancelledError")]
    Cancelled,
    #[serde(rename = "InvalidTransitionError")]
    InvalidTransition,
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BranchConflict => "BranchConflictError",
            ErrorKind::Checkout => "CheckoutError",
            ErrorKind::Snapshot => "SnapshotError",
            ErrorKind::CoreWork => "CoreWorkError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Cancelled => "CancelledError",
            ErrorKind::InvalidTransition => "InvalidTransitionError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal errors that move a session to `Failed`
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Branch '{branch}' is already owned by agent {owner}")]
    BranchConflict { branch: String, owner: String },

    #[error(transparent)]
    Checkout(GitError),

    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    #[error("Core work failed: {0}")]
    CoreWork(String),

    #[error("Phase {phase} exceeded its deadline of {secs}s")]
    Timeout { phase: SessionPhase, secs: u64 },

    #[error("Session cancelled before phase {phase}")]
    Cancelled { phase: SessionPhase },

    #[error(transparent)]
    InvalidTransition(#[from] StateTransitionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::BranchConflict { .. } => ErrorKind::BranchConflict,
            SessionError::Checkout(_) => ErrorKind::Checkout,
            SessionError::Snapshot(_) => ErrorKind::Snapshot,
            SessionError::CoreWork(_) => ErrorKind::CoreWork,
            SessionError::Timeout { .. } => ErrorKind::Timeout,
            SessionError::Cancelled { .. } => ErrorKind::Cancelled,
            SessionError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            SessionError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Errors raised by a unit of core work
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("Unit {unit} failed: {message}")]
    UnitFailed { unit: usize, message: String },

    #[error("Unit {unit} is out of range (total {total})")]
    OutOfRange { unit: usize, total: usize },

    #[error("Failed to run unit {unit}: {source}")]
    Spawn {
        unit: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace scan for unit {unit} failed: {message}")]
    Scan { unit: usize, message: String },
}

/// Errors returned by the orchestrator's admission API
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Branch '{branch}' is already owned by agent {owner}")]
    BranchConflict { branch: String, owner: String },

    #[error("Agent id '{0}' is already in use")]
    DuplicateAgent(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session {0} ended without an outcome")]
    SessionLost(String),

    #[error("Orchestrator is shutting down")]
    ShuttingDown,
}

/// Errors raised while persisting session records
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write record {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while rendering commit and merge request text
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to parse template '{name}': {message}")]
    Parse { name: String, message: String },

    #[error("Failed to render template '{name}': {message}")]
    Render { name: String, message: String },
}

/// Errors raised while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Failed to write config file {path}: {message}")]
    Write { path: String, message: String },
}
