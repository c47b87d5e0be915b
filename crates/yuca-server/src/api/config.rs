// Config entry routes
// Reads are served from local storage on any node (possibly stale on a
// follower); writes go through the replicated log on the leader only

use actix_web::{HttpResponse, Scope, delete, get, put, web};
use tracing::{error, info};

use yuca_api::{KeyList, WriteOutcome};
use yuca_consistency::{Command, CommandResponse};

use crate::error::ApiError;
use crate::model::AppState;

#[get("/list")]
async fn list_configs(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let keys = state.store.list_keys().map_err(|e| {
        error!("failed to list config entries: {}", e);
        ApiError::Storage(e.to_string())
    })?;

    Ok(HttpResponse::Ok().json(KeyList { keys }))
}

#[get("/{id}")]
async fn get_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    let value = state
        .store
        .get(&key)
        .map_err(|e| ApiError::from_storage(e, &key))?;

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(value))
}

#[put("/{id}")]
async fn put_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    state.ensure_leader()?;

    let response = state
        .node
        .propose(Command::put(key.clone(), body.to_vec()), state.apply_timeout)
        .await
        .map_err(|e| {
            error!(%key, role = ?state.node.server_state(), "put failed in consensus: {}", e);
            ApiError::from_consensus(e)
        })?;

    ack(response, "put", &key)
}

#[delete("/{id}")]
async fn delete_config(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    state.ensure_leader()?;

    // A delete is an ordinary command with a tombstone value: it takes the
    // same commit path as a write, so writes and deletes on one key stay
    // totally ordered.
    let response = state
        .node
        .propose(Command::tombstone(key.clone()), state.apply_timeout)
        .await
        .map_err(|e| {
            error!(%key, role = ?state.node.server_state(), "delete failed in consensus: {}", e);
            ApiError::from_consensus(e)
        })?;

    ack(response, "delete", &key)
}

/// Turn an apply result into the response, never reporting a failed apply
/// as success.
fn ack(response: CommandResponse, operation: &str, key: &str) -> Result<HttpResponse, ApiError> {
    if response.success {
        info!(%key, operation, "write committed");
        Ok(HttpResponse::Ok().json(WriteOutcome::Ok))
    } else {
        let message = response
            .message
            .unwrap_or_else(|| "apply failed".to_string());
        error!(%key, operation, "apply reported failure: {}", message);
        Err(ApiError::Consensus(message))
    }
}

pub fn routers() -> Scope {
    web::scope("/config")
        .service(list_configs)
        .service(get_config)
        .service(put_config)
        .service(delete_config)
}
