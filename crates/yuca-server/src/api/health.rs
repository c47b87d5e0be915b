use actix_web::{HttpResponse, Responder, Scope, get, web};

use crate::model::AppState;

#[get("/liveness")]
async fn liveness() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

#[get("/readiness")]
async fn readiness(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().body(format!("{:?}", state.node.server_state()))
}

pub fn routers() -> Scope {
    web::scope("/health").service(liveness).service(readiness)
}
