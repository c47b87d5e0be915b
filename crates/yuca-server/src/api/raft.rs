// Internal raft RPC endpoints, called by peer nodes only

use actix_web::{HttpResponse, Scope, post, web};
use openraft::raft::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};

use yuca_consistency::{NodeId, TypeConfig};

use crate::error::ApiError;
use crate::model::AppState;

#[post("/append")]
async fn append(
    state: web::Data<AppState>,
    rpc: web::Json<AppendEntriesRequest<TypeConfig>>,
) -> Result<HttpResponse, ApiError> {
    let response = state
        .node
        .append_entries(rpc.into_inner())
        .await
        .map_err(|e| ApiError::Consensus(e.to_string()))?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/vote")]
async fn vote(
    state: web::Data<AppState>,
    rpc: web::Json<VoteRequest<NodeId>>,
) -> Result<HttpResponse, ApiError> {
    let response = state
        .node
        .vote(rpc.into_inner())
        .await
        .map_err(|e| ApiError::Consensus(e.to_string()))?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/snapshot")]
async fn snapshot(
    state: web::Data<AppState>,
    rpc: web::Json<InstallSnapshotRequest<TypeConfig>>,
) -> Result<HttpResponse, ApiError> {
    let response = state
        .node
        .install_snapshot(rpc.into_inner())
        .await
        .map_err(|e| ApiError::Consensus(e.to_string()))?;
    Ok(HttpResponse::Ok().json(response))
}

pub fn routers() -> Scope {
    web::scope("/raft")
        .service(append)
        .service(vote)
        .service(snapshot)
}
