// Raft timing and on-disk layout settings for one node

use std::path::PathBuf;
use std::time::Duration;

use super::error::ConsensusError;

/// Per-node raft settings: election timing, snapshot policy, and the data
/// directory layout (`logs/` for the consensus log, `state/` for the
/// replicated store, `snapshots/` for retained snapshots).
#[derive(Clone, Debug)]
pub struct RaftSettings {
    /// Election timeout lower bound in milliseconds; a follower that hears
    /// nothing from the leader within this window starts an election.
    pub election_timeout_ms: u64,

    /// Leader heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Number of log entries since the last snapshot before a new snapshot
    /// is taken for log compaction.
    pub snapshot_threshold: u64,

    /// How many of the most recent snapshots to retain on disk. Must be at
    /// least one.
    pub snapshot_retain: usize,

    /// Root data directory for this node.
    pub data_dir: PathBuf,
}

impl Default for RaftSettings {
    fn default() -> Self {
        Self {
            election_timeout_ms: 1500,
            heartbeat_interval_ms: 500,
            snapshot_threshold: 5000,
            snapshot_retain: 2,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl RaftSettings {
    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Consensus log directory, owned by the raft layer.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Replicated state machine directory (the config store).
    pub fn state_machine_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    /// Snapshot directory, pruned to `snapshot_retain` files.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    /// Create all data directories if missing.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.log_dir())?;
        std::fs::create_dir_all(self.state_machine_dir())?;
        std::fs::create_dir_all(self.snapshot_dir())?;
        Ok(())
    }

    /// Reject settings a node cannot safely run with.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.snapshot_retain < 1 {
            return Err(ConsensusError::InvalidSettings(
                "snapshot retain count must be at least one".to_string(),
            ));
        }
        if self.heartbeat_interval_ms >= self.election_timeout_ms {
            return Err(ConsensusError::InvalidSettings(
                "heartbeat interval must be shorter than the election timeout".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_openraft_config(&self) -> openraft::Config {
        openraft::Config {
            cluster_name: "yuca".to_string(),
            election_timeout_min: self.election_timeout_ms,
            election_timeout_max: self.election_timeout_ms * 2,
            heartbeat_interval: self.heartbeat_interval_ms,
            snapshot_policy: openraft::SnapshotPolicy::LogsSinceLast(self.snapshot_threshold),
            ..Default::default()
        }
    }
}
