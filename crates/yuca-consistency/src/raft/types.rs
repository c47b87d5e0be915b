// Raft type configuration for the yuca cluster

use std::io::Cursor;

use openraft::{BasicNode, TokioRuntime};

use super::request::{Command, CommandResponse};

/// Stable node identifier, assigned by the operator and unique for the
/// lifetime of the cluster.
pub type NodeId = u64;

openraft::declare_raft_types!(
    /// Type configuration: commands carry config mutations, nodes carry
    /// the HTTP address used for both consensus RPC and the public API.
    pub TypeConfig:
        D = Command,
        R = CommandResponse,
        NodeId = NodeId,
        Node = BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime,
);

pub type Raft = openraft::Raft<TypeConfig>;

pub use openraft::ServerState;
