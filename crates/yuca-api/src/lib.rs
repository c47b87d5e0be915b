//! Shared HTTP protocol models for the yuca configuration store.
//!
//! Both the server and the cluster join client depend on this crate so that
//! the leader-redirect hint is always decoded from the response body. The
//! redirect is an application-level signal: no `Location` header is ever
//! set, and no HTTP client should auto-follow it.

use serde::{Deserialize, Serialize};

/// Outcome of a write-path request (PUT/DELETE config, add-voter).
///
/// The transport status code is advisory; callers branch on this envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum WriteOutcome {
    /// The operation committed on the leader.
    Ok,
    /// This node is not the leader; reissue the same request against
    /// `leader_addr`.
    #[serde(rename_all = "camelCase")]
    Redirect { leader_addr: String },
    /// No leader is currently elected; retry later against the same node.
    Unavailable,
    /// The operation reached the leader but failed.
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

/// Body of `POST /cluster/add-voter`: the joining node's identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddVoterRequest {
    /// Stable node id, unique for the lifetime of the cluster.
    pub id: u64,
    /// HTTP address (`host:port`) other nodes use to reach this node for
    /// both consensus RPC and the public API.
    pub address: String,
}

/// Body of `GET /config/list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeyList {
    pub keys: Vec<String>,
}

/// Normalize a `host:port` member address into a base URL.
///
/// Membership addresses are stored without a scheme; requests need one.
pub fn http_base(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", addr.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_outcome_round_trip() {
        let outcome = WriteOutcome::Redirect {
            leader_addr: "10.0.0.1:8080".to_string(),
        };

        let serialized = serde_json::to_string(&outcome).unwrap();
        let deserialized: WriteOutcome = serde_json::from_str(&serialized).unwrap();

        assert_eq!(outcome, deserialized);
    }

    #[test]
    fn test_write_outcome_wire_shape() {
        let json = serde_json::to_value(WriteOutcome::Redirect {
            leader_addr: "n2:8080".to_string(),
        })
        .unwrap();

        assert_eq!(json["outcome"], "redirect");
        assert_eq!(json["leaderAddr"], "n2:8080");

        let ok = serde_json::to_value(WriteOutcome::Ok).unwrap();
        assert_eq!(ok["outcome"], "ok");
    }

    #[test]
    fn test_add_voter_request_camel_case() {
        let req = AddVoterRequest {
            id: 2,
            address: "127.0.0.1:8081".to_string(),
        };

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], 2);
        assert_eq!(json["address"], "127.0.0.1:8081");
    }

    #[test]
    fn test_http_base() {
        assert_eq!(http_base("127.0.0.1:8080"), "http://127.0.0.1:8080");
        assert_eq!(http_base("http://n1:8080/"), "http://n1:8080");
        assert_eq!(http_base("https://n1:8080"), "https://n1:8080");
    }
}
