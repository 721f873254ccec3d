//! Shared helpers for API integration tests.
//!
//! Tests drive the real router with `tower::ServiceExt::oneshot` against an
//! in-memory store, so no listener or database is needed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rangeforge_api::config::ServerConfig;
use rangeforge_api::router::build_app_router;
use rangeforge_api::build_state;
use rangeforge_db::MemoryStore;
use rangeforge_provisioner::{
    DeployOutcome, DeployPlan, DestroyPlan, ProvisionError, ProvisionedHost, ProvisionedSubnet,
    ProvisionedVpc, Provisioner,
};
use rangeforge_worker::{JobExecutor, PoolHandle, WorkSignal, WorkerConfig, WorkerPool};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const USER: &str = "alice";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
        embedded_workers: false,
    }
}

/// The router plus the handles a test needs to look behind it.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub signal: WorkSignal,
}

/// Build the full application router over a fresh in-memory store.
pub fn build_test_app() -> TestApp {
    let store = MemoryStore::new();
    let signal = WorkSignal::new();
    let state = build_state(Arc::new(store.clone()), None, signal.clone());
    TestApp {
        router: build_app_router(state, &test_config()),
        store,
        signal,
    }
}

impl TestApp {
    /// Start a worker pool over this app's store, woken by its submissions.
    pub fn spawn_workers(&self, provisioner: Arc<dyn Provisioner>) -> PoolHandle {
        let config = WorkerConfig {
            concurrency: 2,
            poll_interval: Duration::from_millis(50),
            max_attempts: 2,
            retry_backoff: Duration::from_millis(10),
            provision_timeout: Duration::from_secs(5),
        };
        let executor = JobExecutor::new(Arc::new(self.store.clone()), provisioner, config);
        WorkerPool::new(executor, self.signal.clone()).spawn(CancellationToken::new())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(request(Method::GET, uri, USER, Body::empty())).await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(request(Method::DELETE, uri, USER, Body::empty())).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.post_json_as(USER, uri, body).await
    }

    pub async fn post_json_as(&self, user: &str, uri: &str, body: Value) -> Response<Body> {
        self.send(request(Method::POST, uri, user, Body::from(body.to_string())))
            .await
    }

    /// Create [`valid_blueprint`] and return its id.
    pub async fn create_blueprint(&self) -> String {
        let response = self.post_json("/api/v1/blueprints", valid_blueprint()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Submit a deploy and return the parsed response.
    pub async fn deploy(&self, blueprint_id: &str, name: &str) -> (StatusCode, Value) {
        let response = self
            .post_json(
                "/api/v1/ranges/deploy",
                json!({"blueprint_id": blueprint_id, "name": name, "region": "us-east-1"}),
            )
            .await;
        (response.status(), body_json(response).await)
    }

    /// Poll `GET /jobs/{id}` until the job is terminal.
    pub async fn wait_for_job(&self, job_id: &str) -> Value {
        for _ in 0..200 {
            let job = body_json(self.get(&format!("/api/v1/jobs/{job_id}")).await).await;
            let status = job["data"]["status"].as_str().unwrap_or_default().to_string();
            if status == "complete" || status == "failed" {
                return job["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {job_id} did not finish");
    }
}

pub fn request(method: Method, uri: &str, user: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user", user)
        .body(body)
        .unwrap()
}

/// Parse a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A two-subnet blueprint that passes validation.
pub fn valid_blueprint() -> Value {
    json!({
        "name": "red team lab",
        "description": "web tier and workstations",
        "provider": "aws",
        "features": {"vnc": true},
        "vpcs": [{
            "name": "corp",
            "cidr": "10.0.0.0/16",
            "subnets": [
                {
                    "name": "dmz",
                    "cidr": "10.0.1.0/24",
                    "hosts": [
                        {"hostname": "web", "os": "ubuntu_22", "size": "small", "disk_gib": 20}
                    ]
                },
                {
                    "name": "office",
                    "cidr": "10.0.2.0/24",
                    "hosts": [
                        {"hostname": "ws1", "os": "windows_2022", "size": "medium", "disk_gib": 64}
                    ]
                }
            ]
        }]
    })
}

/// Provisioner that reports every requested entity as created, or fails
/// every call with `failure`.
#[derive(Default)]
pub struct StubProvisioner {
    pub failure: Option<String>,
}

impl StubProvisioner {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl Provisioner for StubProvisioner {
    async fn deploy(&self, plan: &DeployPlan) -> Result<DeployOutcome, ProvisionError> {
        if let Some(message) = &self.failure {
            return Err(ProvisionError::terminal(message.clone()));
        }
        let vpcs = plan
            .vpcs
            .iter()
            .map(|vpc| ProvisionedVpc {
                name: vpc.name.clone(),
                resource_id: format!("vpc-{}", vpc.name),
                subnets: vpc
                    .subnets
                    .iter()
                    .map(|subnet| ProvisionedSubnet {
                        name: subnet.name.clone(),
                        resource_id: format!("subnet-{}", subnet.name),
                        hosts: subnet
                            .hosts
                            .iter()
                            .map(|host| ProvisionedHost {
                                hostname: host.hostname.clone(),
                                resource_id: format!("i-{}", host.hostname),
                                ip_address: None,
                                status: None,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Ok(DeployOutcome { vpcs, state: None })
    }

    async fn destroy(&self, _plan: &DestroyPlan) -> Result<(), ProvisionError> {
        match &self.failure {
            Some(message) => Err(ProvisionError::terminal(message.clone())),
            None => Ok(()),
        }
    }
}
