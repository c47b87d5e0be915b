// Cluster membership routes

use actix_web::{HttpResponse, Scope, post, web};
use tracing::{error, info};

use yuca_api::{AddVoterRequest, WriteOutcome};

use crate::error::ApiError;
use crate::model::AppState;

#[post("/add-voter")]
async fn add_voter(
    state: web::Data<AppState>,
    body: web::Json<AddVoterRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    if request.address.trim().is_empty() {
        return Err(ApiError::Validation(
            "voter address must not be empty".to_string(),
        ));
    }

    state.ensure_leader()?;

    state
        .node
        .add_voter(request.id, request.address.clone(), state.apply_timeout)
        .await
        .map_err(|e| {
            error!(
                voter_id = request.id,
                voter_addr = %request.address,
                role = ?state.node.server_state(),
                "add-voter failed: {}", e
            );
            ApiError::from_consensus(e)
        })?;

    info!(voter_id = request.id, voter_addr = %request.address, "voter added");
    Ok(HttpResponse::Ok().json(WriteOutcome::Ok))
}

pub fn routers() -> Scope {
    web::scope("/cluster").service(add_voter)
}
