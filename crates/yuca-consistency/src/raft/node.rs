// Consensus node facade
// Wraps the raft handle behind the narrow contract the request router
// consumes: role queries, leader hint, propose, add-voter, bootstrap

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use openraft::error::{ClientWriteError, InitializeError, InstallSnapshotError, RaftError};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::BasicNode;
use tracing::{error, info};

use yuca_storage::ConfigStore;

use super::error::ConsensusError;
use super::log_store::LogStore;
use super::network::HttpNetworkFactory;
use super::request::{Command, CommandResponse};
use super::settings::RaftSettings;
use super::state_machine::KvStateMachine;
use super::types::{NodeId, Raft, ServerState, TypeConfig};

/// One node's handle on the replicated cluster.
///
/// The wrapped raft instance is a process-wide singleton with its own
/// internal concurrency discipline; this facade only reads its status or
/// calls its defined write operations.
pub struct RaftNode {
    id: NodeId,
    addr: String,
    raft: Raft,
}

impl RaftNode {
    /// Build the log store, state machine, and transport, then start the
    /// raft instance. The node joins no cluster by itself; see
    /// [`bootstrap_self`](Self::bootstrap_self) and the join protocol.
    pub async fn start(
        id: NodeId,
        addr: String,
        settings: &RaftSettings,
        store: Arc<ConfigStore>,
    ) -> Result<Self, ConsensusError> {
        settings.validate()?;
        settings.ensure_dirs()?;

        let config = settings
            .to_openraft_config()
            .validate()
            .map_err(|e| ConsensusError::InvalidSettings(e.to_string()))?;

        let log_store = LogStore::open(settings.log_dir())
            .await
            .map_err(|e| ConsensusError::Storage(e.to_string()))?;
        let state_machine =
            KvStateMachine::new(store, settings.snapshot_dir(), settings.snapshot_retain)
                .await
                .map_err(|e| ConsensusError::Storage(e.to_string()))?;

        let raft = Raft::new(
            id,
            Arc::new(config),
            HttpNetworkFactory::new(),
            log_store,
            state_machine,
        )
        .await
        .map_err(|e| ConsensusError::Raft(e.to_string()))?;

        info!(node_id = id, %addr, "raft node started");
        Ok(Self { id, addr, raft })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Non-blocking local role query.
    pub fn server_state(&self) -> ServerState {
        self.raft.metrics().borrow().state
    }

    pub fn is_leader(&self) -> bool {
        self.server_state() == ServerState::Leader
    }

    /// Address of the current leader as known locally; transient and
    /// possibly stale, `None` when no leader is known.
    pub fn current_leader(&self) -> Option<String> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader = metrics.current_leader?;
        metrics
            .membership_config
            .membership()
            .get_node(&leader)
            .map(|node| node.addr.clone())
    }

    /// Submit a command to the replicated log and wait for it to commit
    /// and apply, bounded by `timeout`.
    ///
    /// Deadline expiry is a definite failure: the command must not be
    /// assumed committed. Dropping the returned future abandons the wait.
    pub async fn propose(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<CommandResponse, ConsensusError> {
        match tokio::time::timeout(timeout, self.raft.client_write(command)).await {
            Ok(Ok(response)) => Ok(response.data),
            Ok(Err(e)) => Err(Self::map_write_error(e)),
            Err(_) => {
                error!(node_id = self.id, "propose timed out");
                Err(ConsensusError::Timeout(timeout))
            }
        }
    }

    /// Register a new voting member, bounded by `timeout`.
    ///
    /// The node is first added as a learner so it can catch up on the log,
    /// then promoted into the voter set.
    pub async fn add_voter(
        &self,
        id: NodeId,
        address: String,
        timeout: Duration,
    ) -> Result<(), ConsensusError> {
        let promote = async {
            self.raft
                .add_learner(id, BasicNode::new(address.clone()), true)
                .await
                .map_err(Self::map_write_error)?;

            let mut voters: BTreeSet<NodeId> = self
                .raft
                .metrics()
                .borrow()
                .membership_config
                .membership()
                .voter_ids()
                .collect();
            voters.insert(id);

            self.raft
                .change_membership(voters, false)
                .await
                .map_err(Self::map_write_error)?;

            info!(voter_id = id, voter_addr = %address, "voter added");
            Ok::<(), ConsensusError>(())
        };

        match tokio::time::timeout(timeout, promote).await {
            Ok(result) => result,
            Err(_) => {
                error!(voter_id = id, "add-voter timed out");
                Err(ConsensusError::Timeout(timeout))
            }
        }
    }

    /// Initialize a brand-new cluster with the given voting members.
    ///
    /// Intended to be invoked exactly once per cluster lifetime, by the
    /// node that originates it; a second invocation fails.
    pub async fn bootstrap(&self, servers: Vec<(NodeId, String)>) -> Result<(), ConsensusError> {
        let members: BTreeMap<NodeId, BasicNode> = servers
            .into_iter()
            .map(|(id, addr)| (id, BasicNode::new(addr)))
            .collect();

        info!(node_id = self.id, members = members.len(), "bootstrapping cluster");
        self.raft.initialize(members).await.map_err(|e| match e {
            RaftError::APIError(InitializeError::NotAllowed(_)) => {
                ConsensusError::AlreadyInitialized
            }
            other => ConsensusError::Raft(other.to_string()),
        })
    }

    /// Bootstrap with this node as the sole initial voter.
    pub async fn bootstrap_self(&self) -> Result<(), ConsensusError> {
        self.bootstrap(vec![(self.id, self.addr.clone())]).await
    }

    /// Block until a leader is known, for startup and tests.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Result<(), ConsensusError> {
        self.raft
            .wait(Some(timeout))
            .metrics(|m| m.current_leader.is_some(), "leader elected")
            .await
            .map_err(|e| ConsensusError::Raft(e.to_string()))?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        let _ = self.raft.shutdown().await;
    }

    fn map_write_error(e: RaftError<NodeId, ClientWriteError<NodeId, BasicNode>>) -> ConsensusError {
        match e {
            RaftError::APIError(ClientWriteError::ForwardToLeader(forward)) => {
                ConsensusError::NotLeader {
                    leader: forward.leader_node.map(|node| node.addr),
                }
            }
            other => ConsensusError::Raft(other.to_string()),
        }
    }

    // Raft RPC passthroughs for the transport endpoints.

    pub async fn append_entries(
        &self,
        rpc: AppendEntriesRequest<TypeConfig>,
    ) -> Result<AppendEntriesResponse<NodeId>, ConsensusError> {
        self.raft
            .append_entries(rpc)
            .await
            .map_err(|e| ConsensusError::Raft(e.to_string()))
    }

    pub async fn vote(
        &self,
        rpc: VoteRequest<NodeId>,
    ) -> Result<VoteResponse<NodeId>, ConsensusError> {
        self.raft
            .vote(rpc)
            .await
            .map_err(|e| ConsensusError::Raft(e.to_string()))
    }

    pub async fn install_snapshot(
        &self,
        rpc: InstallSnapshotRequest<TypeConfig>,
    ) -> Result<InstallSnapshotResponse<NodeId>, ConsensusError> {
        self.raft
            .install_snapshot(rpc)
            .await
            .map_err(|e: RaftError<NodeId, InstallSnapshotError>| {
                ConsensusError::Raft(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings(dir: &std::path::Path) -> RaftSettings {
        RaftSettings {
            election_timeout_ms: 300,
            heartbeat_interval_ms: 100,
            data_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    async fn single_node(dir: &std::path::Path) -> (Arc<ConfigStore>, RaftNode) {
        let settings = test_settings(dir);
        let store = Arc::new(ConfigStore::open(settings.state_machine_dir()).unwrap());
        let node = RaftNode::start(1, "127.0.0.1:18080".to_string(), &settings, store.clone())
            .await
            .unwrap();
        (store, node)
    }

    #[tokio::test]
    async fn test_uninitialized_node_has_no_leader() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, node) = single_node(dir.path()).await;

        assert!(!node.is_leader());
        assert!(node.current_leader().is_none());

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_bootstrap_elects_self_as_leader() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, node) = single_node(dir.path()).await;

        node.bootstrap_self().await.unwrap();
        node.wait_for_leader(Duration::from_secs(10)).await.unwrap();

        assert!(node.is_leader());
        assert_eq!(node.current_leader().as_deref(), Some("127.0.0.1:18080"));

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_bootstrap_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, node) = single_node(dir.path()).await;

        node.bootstrap_self().await.unwrap();
        node.wait_for_leader(Duration::from_secs(10)).await.unwrap();

        let err = node.bootstrap_self().await.unwrap_err();
        assert!(matches!(err, ConsensusError::AlreadyInitialized));

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_propose_applies_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let (store, node) = single_node(dir.path()).await;

        node.bootstrap_self().await.unwrap();
        node.wait_for_leader(Duration::from_secs(10)).await.unwrap();

        let response = node
            .propose(
                Command::put("foo", b"bar".to_vec()),
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(store.get("foo").unwrap(), b"bar");

        let response = node
            .propose(Command::tombstone("foo"), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(response.success);
        assert!(store.get("foo").unwrap_err().is_not_found());

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_proposes_both_persist() {
        let dir = tempfile::tempdir().unwrap();
        let (store, node) = single_node(dir.path()).await;

        node.bootstrap_self().await.unwrap();
        node.wait_for_leader(Duration::from_secs(10)).await.unwrap();

        let node = Arc::new(node);
        let a = {
            let node = node.clone();
            tokio::spawn(async move {
                node.propose(Command::put("ka", b"va".to_vec()), Duration::from_secs(10))
                    .await
            })
        };
        let b = {
            let node = node.clone();
            tokio::spawn(async move {
                node.propose(Command::put("kb", b"vb".to_vec()), Duration::from_secs(10))
                    .await
            })
        };

        assert!(a.await.unwrap().unwrap().success);
        assert!(b.await.unwrap().unwrap().success);
        assert_eq!(store.get("ka").unwrap(), b"va");
        assert_eq!(store.get("kb").unwrap(), b"vb");

        node.shutdown().await;
    }
}
