//! Replication layer for the yuca configuration store.
//!
//! This crate turns committed raft log entries into storage mutations and
//! exposes the consensus handle the request router consumes:
//! - the replicated [`Command`] and its apply result
//! - the RocksDB-backed state machine with full snapshot/restore
//! - the RocksDB log store
//! - the HTTP transport carrying raft RPCs between nodes
//! - the [`RaftNode`] facade (role queries, propose, add-voter, bootstrap)

#![allow(clippy::result_large_err)]

pub mod raft;

pub use raft::error::ConsensusError;
pub use raft::log_store::LogStore;
pub use raft::node::RaftNode;
pub use raft::request::{Command, CommandResponse};
pub use raft::settings::RaftSettings;
pub use raft::state_machine::KvStateMachine;
pub use raft::types::{NodeId, Raft, ServerState, TypeConfig};
