//! HTTP client for the `/api/v1` endpoints.
//!
//! Every call sends the configured `x-user` header and unwraps the
//! `{"data": ...}` envelope; error envelopes become [`ClientError::Api`].

use rangeforge_core::blueprint::{Blueprint, CreateBlueprint};
use rangeforge_core::job::{DeployRequest, Job, JobHandle, JobListQuery, JobLookup};
use rangeforge_core::range::Range;
use rangeforge_core::types::{BlueprintId, JobId, RangeId};
use rangeforge_core::validation::Violation;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::ClientError;

#[derive(Deserialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    code: String,
    #[serde(default)]
    violations: Vec<Violation>,
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    user: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pool, proxies).
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            user: config.user.clone(),
        }
    }

    // ---- blueprints ----

    pub async fn create_blueprint(&self, input: &CreateBlueprint) -> Result<Blueprint, ClientError> {
        let response = self.request(Method::POST, "/blueprints").json(input).send().await?;
        Self::parse_data(response).await
    }

    pub async fn list_blueprints(&self) -> Result<Vec<Blueprint>, ClientError> {
        let response = self.request(Method::GET, "/blueprints").send().await?;
        Self::parse_data(response).await
    }

    pub async fn get_blueprint(&self, id: BlueprintId) -> Result<Blueprint, ClientError> {
        let response = self
            .request(Method::GET, &format!("/blueprints/{id}"))
            .send()
            .await?;
        Self::parse_data(response).await
    }

    pub async fn delete_blueprint(&self, id: BlueprintId) -> Result<(), ClientError> {
        let response = self
            .request(Method::DELETE, &format!("/blueprints/{id}"))
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- ranges ----

    /// Queue a deploy. Returns as soon as the job is admitted.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<JobHandle, ClientError> {
        let response = self
            .request(Method::POST, "/ranges/deploy")
            .json(request)
            .send()
            .await?;
        Self::parse_data(response).await
    }

    /// Queue teardown of a range.
    pub async fn destroy(&self, id: RangeId) -> Result<JobHandle, ClientError> {
        let response = self
            .request(Method::DELETE, &format!("/ranges/{id}"))
            .send()
            .await?;
        Self::parse_data(response).await
    }

    pub async fn list_ranges(&self) -> Result<Vec<Range>, ClientError> {
        let response = self.request(Method::GET, "/ranges").send().await?;
        Self::parse_data(response).await
    }

    pub async fn get_range(&self, id: RangeId) -> Result<Range, ClientError> {
        let response = self
            .request(Method::GET, &format!("/ranges/{id}"))
            .send()
            .await?;
        Self::parse_data(response).await
    }

    // ---- jobs ----

    /// Look a job up. An unknown job is a [`JobLookup::NotFound`], not an
    /// error.
    pub async fn get_job(&self, id: JobId) -> Result<JobLookup, ClientError> {
        let response = self
            .request(Method::GET, &format!("/jobs/{id}"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            let bytes = response.bytes().await?;
            return match serde_json::from_slice::<DataResponse<JobLookup>>(&bytes) {
                Ok(body) => Ok(body.data),
                Err(_) => Err(Self::api_error(StatusCode::NOT_FOUND, &bytes)),
            };
        }
        Self::parse_data(response).await
    }

    pub async fn list_jobs(&self, query: &JobListQuery) -> Result<Vec<Job>, ClientError> {
        let response = self
            .request(Method::GET, "/jobs")
            .query(query)
            .send()
            .await?;
        Self::parse_data(response).await
    }

    // ---- private helpers ----

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/api/v1{path}", self.base_url));
        match &self.user {
            Some(user) => builder.header("x-user", user),
            None => builder,
        }
    }

    /// Return the response unchanged on success, or its error envelope.
    async fn ensure_success(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let bytes = response.bytes().await?;
        Err(Self::api_error(status, &bytes))
    }

    async fn parse_data<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        let body: DataResponse<T> = response.json().await?;
        Ok(body.data)
    }

    fn api_error(status: StatusCode, body: &[u8]) -> ClientError {
        match serde_json::from_slice::<ErrorResponse>(body) {
            Ok(err) => ClientError::Api {
                status: status.as_u16(),
                code: err.code,
                message: err.error,
                violations: err.violations,
            },
            Err(_) => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                let message = if text.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    text
                };
                ClientError::Api {
                    status: status.as_u16(),
                    code: "HTTP_ERROR".to_string(),
                    message,
                    violations: Vec::new(),
                }
            }
        }
    }
}
