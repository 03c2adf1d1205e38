//! Git operations using git2-rs
//!
//! This module provides git functionality organized into focused submodules:
//! - `manager` - Core GitManager struct and basic operations
//! - `branches` - Branch operations (current branch, create, checkout)
//! - `commits` - Pending changes, staging and commits
//! - `merge` - Merge-base computation and conflict detection
//! - `remote` - Fetching the target branch
//! - `worktrees` - Worktree management for isolated session workspaces
//! - `types` - Shared data structures
//! - `gateway` - The async `VersionControlGateway` seam used by sessions

// Submodules
mod branches;
mod commits;
pub mod gateway;
mod manager;
mod merge;
mod remote;
mod types;
mod worktrees;

pub use gateway::{GitGateway, VersionControlGateway, UNKNOWN_BRANCH};
pub use manager::GitManager;
pub use types::{CommitInfo, FetchOutcome, MergeCheck, WorktreeInfo};
