use std::time::Duration;

use thiserror::Error;

/// Closed error kinds for operations against the consensus layer.
///
/// A timeout is a definite failure from the caller's point of view: the
/// command must not be assumed committed, and the caller decides whether
/// to retry.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("consensus operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("this node is not the leader")]
    NotLeader { leader: Option<String> },

    #[error("cluster is already initialized")]
    AlreadyInitialized,

    #[error("invalid raft settings: {0}")]
    InvalidSettings(String),

    #[error("raft error: {0}")]
    Raft(String),

    #[error("raft storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
