//! Cluster join protocol for the yuca configuration store.
//!
//! A newly starting, non-first node runs [`JoinClient::join`] once to
//! register itself as a voting member with the current leader, following
//! application-level leader-redirect hints until its retry budget runs out.

pub mod error;
pub mod join;

pub use error::JoinError;
pub use join::{JoinClient, JoinConfig};
