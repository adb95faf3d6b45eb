//! REST API integration tests.

mod common;

use serde_json::{Value, json};

use instadash_operator::ObjectKey;
use instadash_operator::store::DashboardStore;

const DASHBOARDS: &str = "/namespaces/default/dashboards";

// =============================================================================
// Version Endpoint
// =============================================================================

#[tokio::test]
async fn test_get_version() {
    let server = common::TestServer::spawn().await;

    let response = server.get("/version").await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert!(!body["version"].as_str().unwrap().is_empty());

    server.shutdown().await;
}

// =============================================================================
// Dashboard Endpoints
// =============================================================================

#[tokio::test]
async fn test_create_dashboard() {
    let server = common::TestServer::spawn().await;

    let response = server
        .post_json(DASHBOARDS, &json!({ "name": "ops", "config": "{\"title\":\"X\"}" }))
        .await;
    assert_eq!(response.status(), 201);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["namespace"], "default");
    assert_eq!(body["name"], "ops");
    assert_eq!(body["config"], "{\"title\":\"X\"}");
    assert_eq!(body["phase"], "Pending");
    assert!(body["dashboard_id"].is_null());
    assert!(body["deletion_timestamp"].is_null());
    assert_eq!(body["finalizers"].as_array().unwrap().len(), 0);
    assert!(!body["uid"].as_str().unwrap().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_create_duplicate_dashboard() {
    let server = common::TestServer::spawn().await;
    let body = json!({ "name": "ops", "config": "{}" });

    assert_eq!(server.post_json(DASHBOARDS, &body).await.status(), 201);
    let response = server.post_json(DASHBOARDS, &body).await;
    assert_eq!(response.status(), 409);

    let error: Value = response.json().await.unwrap();
    assert_eq!(error["code"], 409);

    // Same name in another namespace is fine.
    let response = server
        .post_json("/namespaces/other/dashboards", &body)
        .await;
    assert_eq!(response.status(), 201);

    server.shutdown().await;
}

#[tokio::test]
async fn test_create_dashboard_without_name() {
    let server = common::TestServer::spawn().await;

    let response = server
        .post_json(DASHBOARDS, &json!({ "name": "  ", "config": "{}" }))
        .await;
    assert_eq!(response.status(), 400);

    server.shutdown().await;
}

#[tokio::test]
async fn test_get_dashboard() {
    let server = common::TestServer::spawn().await;
    server
        .post_json(DASHBOARDS, &json!({ "name": "ops", "config": "{}" }))
        .await;

    let response = server.get("/namespaces/default/dashboards/ops").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "ops");

    let response = server.get("/namespaces/default/dashboards/missing").await;
    assert_eq!(response.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_list_dashboards() {
    let server = common::TestServer::spawn().await;
    for (namespace, name) in [("default", "a"), ("default", "b"), ("team", "c")] {
        server
            .post_json(
                &format!("/namespaces/{namespace}/dashboards"),
                &json!({ "name": name, "config": "{}" }),
            )
            .await;
    }

    let response = server.get("/dashboards").await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let names: Vec<&str> = body["dashboards"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_delete_pending_dashboard() {
    let server = common::TestServer::spawn().await;
    server
        .post_json(DASHBOARDS, &json!({ "name": "ops", "config": "{}" }))
        .await;

    // Nothing to clean up, so it is removed right away.
    let response = server.delete("/namespaces/default/dashboards/ops").await;
    assert_eq!(response.status(), 204);

    let response = server.get("/namespaces/default/dashboards/ops").await;
    assert_eq!(response.status(), 404);

    let response = server.delete("/namespaces/default/dashboards/ops").await;
    assert_eq!(response.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_delete_provisioned_dashboard_waits_for_finalizer() {
    let server = common::TestServer::spawn().await;
    server
        .post_json(DASHBOARDS, &json!({ "name": "ops", "config": "{}" }))
        .await;

    // Stand in for the reconciler.
    let key = ObjectKey::new("default", "ops");
    let mut d = server.store.get(&key).await.unwrap().unwrap();
    d.status.dashboard_id = "d1".to_string();
    let mut d = server.store.update_status(&d).await.unwrap();
    d.add_finalizer();
    server.store.update_metadata(&d).await.unwrap();

    let response = server.delete("/namespaces/default/dashboards/ops").await;
    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["phase"], "Deleting");
    assert_eq!(body["dashboard_id"], "d1");
    assert!(body["deletion_timestamp"].is_string());

    // Still visible, and a second request changes nothing.
    let response = server.delete("/namespaces/default/dashboards/ops").await;
    assert_eq!(response.status(), 202);
    let response = server.get("/namespaces/default/dashboards/ops").await;
    assert_eq!(response.status(), 200);

    server.shutdown().await;
}
