// Replicated command and apply-result types
// A Command is the unit submitted to the raft log; only the state machine
// interprets it

use serde::{Deserialize, Serialize};

/// A single mutation of the configuration store, totally ordered by the
/// replicated log.
///
/// An absent or empty value is the delete tombstone: applying it removes
/// the key from the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub key: String,
    #[serde(default)]
    pub value: Option<Vec<u8>>,
}

impl Command {
    /// Store `value` under `key`.
    pub fn put(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }

    /// Delete `key`.
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Whether applying this command deletes rather than stores.
    pub fn is_tombstone(&self) -> bool {
        match &self.value {
            None => true,
            Some(v) => v.is_empty(),
        }
    }
}

/// Result of applying one command, returned through the consensus layer to
/// whichever node originated the write.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}
