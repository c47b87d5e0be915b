// Shared state handed to every request handler

use std::sync::Arc;
use std::time::Duration;

use yuca_consistency::RaftNode;
use yuca_storage::ConfigStore;

use crate::error::ApiError;

/// Per-node application state.
///
/// The store is the same instance the state machine applies to, so reads
/// observe everything applied locally (possibly stale on a follower). The
/// node handle is read for role queries and written only through its
/// defined operations.
pub struct AppState {
    pub node: Arc<RaftNode>,
    pub store: Arc<ConfigStore>,
    /// Deadline for propose/add-voter calls into the consensus layer.
    pub apply_timeout: Duration,
}

impl AppState {
    /// Gate for write-path requests: only the leader may accept them.
    ///
    /// A non-leader answers with a redirect hint when a leader is known,
    /// and with a distinct unavailable condition when none is.
    pub fn ensure_leader(&self) -> Result<(), ApiError> {
        if self.node.is_leader() {
            return Ok(());
        }

        match self.node.current_leader() {
            Some(leader) => Err(ApiError::NotLeader { leader }),
            None => Err(ApiError::NoLeader),
        }
    }
}
