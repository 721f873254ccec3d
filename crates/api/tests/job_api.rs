//! HTTP-level tests for `/api/v1/jobs`, including full deploy and destroy
//! round trips through an in-process worker pool.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{body_json, build_test_app, StubProvisioner};

#[tokio::test]
async fn unknown_job_returns_404_with_a_not_found_lookup() {
    let app = build_test_app();
    let id = "00000000-0000-0000-0000-000000000001";

    let response = app.get(&format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], id);
    assert_eq!(json["data"]["status"], "not_found");
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let app = build_test_app();
    let blueprint_id = app.create_blueprint().await;
    for name in ["r1", "r2", "r3"] {
        app.deploy(&blueprint_id, name).await;
    }

    let all = body_json(app.get("/api/v1/jobs").await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 3);

    let page = body_json(app.get("/api/v1/jobs?limit=2&offset=0").await).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 2);

    let failed = body_json(app.get("/api/v1/jobs?status=failed").await).await;
    assert!(failed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deploy_then_destroy_end_to_end() {
    let app = build_test_app();
    let workers = app.spawn_workers(Arc::new(StubProvisioner::default()));
    let blueprint_id = app.create_blueprint().await;

    let (status, submitted) = app.deploy(&blueprint_id, "r1").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job = app
        .wait_for_job(submitted["data"]["job_id"].as_str().unwrap())
        .await;
    assert_eq!(job["status"], "complete");
    assert_eq!(job["attempt"], 1);

    let range_id = job["result"]["range_id"].as_str().unwrap().to_string();
    let range = body_json(app.get(&format!("/api/v1/ranges/{range_id}")).await).await;
    assert_eq!(range["data"]["status"], "ready");
    assert_eq!(range["data"]["vpcs"][0]["resource_id"], "vpc-corp");
    assert_eq!(
        range["data"]["vpcs"][0]["subnets"][1]["hosts"][0]["resource_id"],
        "i-ws1"
    );

    // The name is now held by the ready range.
    let (status, _) = app.deploy(&blueprint_id, "r1").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let response = app.delete(&format!("/api/v1/ranges/{range_id}")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let destroy = body_json(response).await;
    let job = app
        .wait_for_job(destroy["data"]["job_id"].as_str().unwrap())
        .await;
    assert_eq!(job["status"], "complete");

    let response = app.get(&format!("/api/v1/ranges/{range_id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    workers.shutdown().await;
}

#[tokio::test]
async fn failed_deploy_leaves_an_error_range() {
    let app = build_test_app();
    let workers = app.spawn_workers(Arc::new(StubProvisioner::failing(
        "InsufficientInstanceCapacity",
    )));
    let blueprint_id = app.create_blueprint().await;

    let (_, submitted) = app.deploy(&blueprint_id, "r1").await;
    let job = app
        .wait_for_job(submitted["data"]["job_id"].as_str().unwrap())
        .await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["error"], "InsufficientInstanceCapacity");

    let ranges = body_json(app.get("/api/v1/ranges").await).await;
    assert_eq!(ranges["data"][0]["status"], "error");
    assert_eq!(ranges["data"][0]["name"], "r1");

    workers.shutdown().await;
}
