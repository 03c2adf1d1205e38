//! Branch ownership map
//!
//! A branch is owned by at most one live session. Ownership is represented by
//! a [`BranchLease`]; dropping the lease releases the branch, including when
//! the owning task unwinds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::OrchestratorError;
use crate::utils::lock_mutex_recover;

/// Shared `branch -> agent_id` ownership map
#[derive(Debug, Default)]
pub struct BranchRegistry {
    owners: Mutex<HashMap<String, String>>,
}

impl BranchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `branch` for `agent_id`
    pub fn claim(
        self: &Arc<Self>,
        branch: &str,
        agent_id: &str,
    ) -> Result<BranchLease, OrchestratorError> {
        let mut owners = lock_mutex_recover(&self.owners);

        if let Some(owner) = owners.get(branch) {
            log::warn!(
                "[BranchRegistry] Branch {} requested by {} is owned by {}",
                branch,
                agent_id,
                owner
            );
            return Err(OrchestratorError::BranchConflict {
                branch: branch.to_string(),
                owner: owner.clone(),
            });
        }

        owners.insert(branch.to_string(), agent_id.to_string());
        log::debug!("[BranchRegistry] {} claimed {}", agent_id, branch);

        Ok(BranchLease {
            registry: Arc::clone(self),
            branch: branch.to_string(),
            agent_id: agent_id.to_string(),
        })
    }

    /// Agent currently owning `branch`
    pub fn owner(&self, branch: &str) -> Option<String> {
        lock_mutex_recover(&self.owners).get(branch).cloned()
    }

    pub fn len(&self) -> usize {
        lock_mutex_recover(&self.owners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, branch: &str, agent_id: &str) {
        let mut owners = lock_mutex_recover(&self.owners);
        if owners.get(branch).map(String::as_str) == Some(agent_id) {
            owners.remove(branch);
            log::debug!("[BranchRegistry] {} released {}", agent_id, branch);
        }
    }
}

/// Ownership of one branch; released on drop
#[derive(Debug)]
pub struct BranchLease {
    registry: Arc<BranchRegistry>,
    branch: String,
    agent_id: String,
}

impl BranchLease {
    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

impl Drop for BranchLease {
    fn drop(&mut self) {
        self.registry.release(&self.branch, &self.agent_id);
    }
}
