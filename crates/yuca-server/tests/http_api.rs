//! Router integration tests against a single in-process node.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{App, test, web};

use yuca_api::{KeyList, WriteOutcome};
use yuca_consistency::{RaftNode, RaftSettings};
use yuca_server::api;
use yuca_server::model::AppState;
use yuca_storage::ConfigStore;

fn fast_settings(dir: &std::path::Path) -> RaftSettings {
    RaftSettings {
        election_timeout_ms: 300,
        heartbeat_interval_ms: 100,
        data_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

/// Start a node and, when `bootstrap` is set, make it the leader of a
/// single-node cluster.
async fn node_state(dir: &std::path::Path, bootstrap: bool) -> web::Data<AppState> {
    let settings = fast_settings(dir);
    settings.ensure_dirs().unwrap();

    let store = Arc::new(ConfigStore::open(settings.state_machine_dir()).unwrap());
    let node = Arc::new(
        RaftNode::start(1, "127.0.0.1:18080".to_string(), &settings, store.clone())
            .await
            .unwrap(),
    );

    if bootstrap {
        node.bootstrap_self().await.unwrap();
        node.wait_for_leader(Duration::from_secs(10)).await.unwrap();
    }

    web::Data::new(AppState {
        node,
        store,
        apply_timeout: Duration::from_secs(10),
    })
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .service(api::config::routers())
                .service(api::cluster::routers())
                .service(api::health::routers()),
        )
        .await
    };
}

#[actix_web::test]
async fn test_put_then_get_returns_value() {
    let dir = tempfile::tempdir().unwrap();
    let state = node_state(dir.path(), true).await;
    let app = test_app!(state);

    let response = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/config/foo")
            .set_payload("bar")
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: WriteOutcome = test::read_body_json(response).await;
    assert_eq!(outcome, WriteOutcome::Ok);

    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/config/foo").to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&test::read_body(response).await[..], b"bar");

    state.node.shutdown().await;
}

#[actix_web::test]
async fn test_get_missing_key_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let state = node_state(dir.path(), true).await;
    let app = test_app!(state);

    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/config/absent").to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    state.node.shutdown().await;
}

#[actix_web::test]
async fn test_delete_removes_key_from_reads_and_listing() {
    let dir = tempfile::tempdir().unwrap();
    let state = node_state(dir.path(), true).await;
    let app = test_app!(state);

    for (key, value) in [("keep", "a"), ("drop", "b")] {
        let response = test::call_service(
            &app,
            test::TestRequest::put()
                .uri(&format!("/config/{}", key))
                .set_payload(value)
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = test::call_service(
        &app,
        test::TestRequest::delete().uri("/config/drop").to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: WriteOutcome = test::read_body_json(response).await;
    assert_eq!(outcome, WriteOutcome::Ok);

    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/config/drop").to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Hard delete: the key no longer appears in the listing.
    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/config/list").to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing: KeyList = test::read_body_json(response).await;
    assert_eq!(listing.keys, vec!["keep".to_string()]);

    state.node.shutdown().await;
}

#[actix_web::test]
async fn test_writes_without_leader_are_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let state = node_state(dir.path(), false).await;
    let app = test_app!(state);

    let response = test::call_service(
        &app,
        test::TestRequest::put()
            .uri("/config/foo")
            .set_payload("bar")
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let outcome: WriteOutcome = test::read_body_json(response).await;
    assert_eq!(outcome, WriteOutcome::Unavailable);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/cluster/add-voter")
            .set_json(yuca_api::AddVoterRequest {
                id: 2,
                address: "127.0.0.1:18081".to_string(),
            })
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.node.shutdown().await;
}

#[actix_web::test]
async fn test_reads_are_served_without_a_leader() {
    let dir = tempfile::tempdir().unwrap();
    let state = node_state(dir.path(), false).await;
    let app = test_app!(state);

    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/config/list").to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    state.node.shutdown().await;
}

#[actix_web::test]
async fn test_add_voter_with_empty_address_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = node_state(dir.path(), true).await;
    let app = test_app!(state);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/cluster/add-voter")
            .set_json(yuca_api::AddVoterRequest {
                id: 2,
                address: "  ".to_string(),
            })
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    state.node.shutdown().await;
}

#[actix_web::test]
async fn test_health_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let state = node_state(dir.path(), true).await;
    let app = test_app!(state);

    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/health/liveness").to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/health/readiness")
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&test::read_body(response).await[..], b"Leader");

    state.node.shutdown().await;
}
