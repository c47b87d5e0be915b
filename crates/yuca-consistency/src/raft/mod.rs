// Raft replication module
// Applies the totally ordered log to local storage and exposes the
// consensus contract consumed by the request router

pub mod error;
pub mod log_store;
pub mod network;
pub mod node;
pub mod request;
pub mod settings;
pub mod state_machine;
pub mod types;

pub use error::ConsensusError;
pub use network::HttpNetworkFactory;
pub use node::RaftNode;
pub use request::{Command, CommandResponse};
pub use settings::RaftSettings;
pub use state_machine::KvStateMachine;
pub use types::{NodeId, Raft, ServerState, TypeConfig};
