// Error handling and response mapping for the request router
// Each error kind maps to one response shape; the redirect hint rides in
// the body as a tagged envelope, never as a transport-level redirect

use actix_web::http::StatusCode;
use actix_web::HttpResponse;

use yuca_api::WriteOutcome;
use yuca_consistency::ConsensusError;
use yuca_storage::StorageError;

/// Closed error kinds surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("config entry not found: {0}")]
    NotFound(String),

    #[error("this node is not the leader; leader is at {leader}")]
    NotLeader { leader: String },

    #[error("no leader currently elected")]
    NoLeader,

    #[error("consensus failure: {0}")]
    Consensus(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl ApiError {
    /// Map a consensus-layer failure observed on the write path.
    ///
    /// Leadership may have moved between the router's role check and the
    /// propose call; that late not-leader still becomes a redirect.
    pub fn from_consensus(e: ConsensusError) -> Self {
        match e {
            ConsensusError::NotLeader {
                leader: Some(leader),
            } => ApiError::NotLeader { leader },
            ConsensusError::NotLeader { leader: None } => ApiError::NoLeader,
            other => ApiError::Consensus(other.to_string()),
        }
    }

    /// Map a storage-engine failure observed on the read path.
    pub fn from_storage(e: StorageError, key: &str) -> Self {
        if e.is_not_found() {
            ApiError::NotFound(key.to_string())
        } else {
            ApiError::Storage(e.to_string())
        }
    }
}

impl actix_web::error::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            // Application-level hint only: no Location header is set, so no
            // HTTP client re-dispatches the request on its own.
            ApiError::NotLeader { .. } => StatusCode::TEMPORARY_REDIRECT,
            ApiError::NoLeader => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Consensus(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Validation(message) => HttpResponse::BadRequest().body(message.clone()),
            ApiError::NotFound(key) => {
                HttpResponse::NotFound().body(format!("config entry not found: {}", key))
            }
            ApiError::NotLeader { leader } => {
                HttpResponse::TemporaryRedirect().json(WriteOutcome::Redirect {
                    leader_addr: leader.clone(),
                })
            }
            ApiError::NoLeader => HttpResponse::ServiceUnavailable().json(WriteOutcome::Unavailable),
            ApiError::Consensus(message) | ApiError::Storage(message) => {
                HttpResponse::InternalServerError().json(WriteOutcome::Error {
                    message: message.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::error::ResponseError;

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("k".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::NotLeader {
                leader: "n1:8080".into()
            }
            .status_code(),
            StatusCode::TEMPORARY_REDIRECT
        );
        assert_eq!(ApiError::NoLeader.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::Consensus("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_late_not_leader_becomes_redirect() {
        let err = ApiError::from_consensus(ConsensusError::NotLeader {
            leader: Some("n2:8080".to_string()),
        });
        assert!(matches!(err, ApiError::NotLeader { leader } if leader == "n2:8080"));

        let err = ApiError::from_consensus(ConsensusError::NotLeader { leader: None });
        assert!(matches!(err, ApiError::NoLeader));
    }

    #[test]
    fn test_redirect_response_has_no_location_header() {
        let err = ApiError::NotLeader {
            leader: "n2:8080".to_string(),
        };
        let response = err.error_response();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(response.headers().get("Location").is_none());
    }
}
