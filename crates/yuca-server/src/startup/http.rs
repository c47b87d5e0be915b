//! HTTP server setup.

use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};

use crate::api;
use crate::model::AppState;

/// In-flight requests get this long to drain on shutdown.
const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Raft snapshot chunks ride JSON bodies; a chunk of binary data expands
/// to several bytes per byte under JSON number encoding, so the extractor
/// limit must sit well above the chunk size.
const JSON_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Create and bind the node's HTTP server.
///
/// One listener carries the public config API, the cluster membership
/// endpoint, the internal raft RPCs, and the health probes, so the
/// membership address of a node is also its API address.
pub fn config_server(state: Arc<AppState>, addr: &str) -> std::io::Result<Server> {
    Ok(HttpServer::new(move || {
        App::new()
            .app_data(web::JsonConfig::default().limit(JSON_BODY_LIMIT))
            .app_data(web::Data::from(state.clone()))
            .service(api::config::routers())
            .service(api::cluster::routers())
            .service(api::raft::routers())
            .service(api::health::routers())
    })
    .shutdown_timeout(SHUTDOWN_GRACE_SECS)
    .bind(addr)?
    .run())
}
