//! ARM control-plane transport
//!
//! A pure transport layer: one request per operation, uniform error
//! classification, and a single built-in backpressure accommodation (the
//! 429 retry loop). Cancellation is cooperative - it is checked before each
//! attempt and never aborts an in-flight call.

use crate::auth::TokenProvider;
use crate::error::{ArmError, Result};
use crate::path::ensure_api_version;
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Control-plane operations the rest of hopbox is written against.
///
/// Implemented by [`ArmClient`] in production and by scripted mocks in
/// tests.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch the current representation of a resource.
    async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<Value>;

    /// Idempotent upsert of a resource.
    async fn put(&self, path: &str, body: Value, cancel: &CancellationToken) -> Result<Value>;

    /// Delete a resource. 202 and 204 are the only success statuses.
    async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<()>;

    /// Lightweight existence probe. 404 is a normal `false`; any status
    /// other than 200/204/404 is a protocol violation and fails loudly.
    async fn exists(&self, path: &str, cancel: &CancellationToken) -> Result<bool>;
}

/// Backoff schedule for throttled (429) upserts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for a 0-based attempt, with up to 50% jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.saturating_mul(2u32.saturating_pow(attempt));
        let capped = base.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..=0.5);
        capped.mul_f64(1.0 + jitter)
    }
}

/// Authenticated client for the Azure Resource Manager REST API.
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    subscription_id: Option<String>,
    auth: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
}

impl ArmClient {
    /// Client scoped to the account's default subscription.
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self::with_endpoint(MANAGEMENT_ENDPOINT, auth)
    }

    /// Point the client at a different management endpoint (sovereign
    /// clouds, loopback test servers).
    pub fn with_endpoint(endpoint: impl Into<String>, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            subscription_id: None,
            auth,
            retry: RetryPolicy::default(),
        }
    }

    /// Scope token acquisition to a specific subscription.
    pub fn for_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    async fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let token = self.auth.token(self.subscription_id.as_deref()).await?;
        let url = format!("{}{}", self.endpoint, ensure_api_version(path));
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token.token)
            .header("Accept", "application/json")
            .header("x-ms-request-id", Uuid::new_v4().to_string()))
    }
}

async fn classify(path: &str, response: reqwest::Response) -> ArmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        ArmError::ClientRejected {
            status: status.as_u16(),
            body,
        }
    } else if status.is_server_error() {
        ArmError::ServerFault {
            status: status.as_u16(),
            body,
        }
    } else {
        ArmError::Protocol {
            status: status.as_u16(),
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl ControlPlane for ArmClient {
    async fn get(&self, path: &str, cancel: &CancellationToken) -> Result<Value> {
        if cancel.is_cancelled() {
            return Err(ArmError::Cancelled);
        }
        tracing::debug!(path, "GET");
        let response = self.request(Method::GET, path).await?.send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
            _ => Err(classify(path, response).await),
        }
    }

    async fn put(&self, path: &str, body: Value, cancel: &CancellationToken) -> Result<Value> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(ArmError::Cancelled);
            }
            tracing::debug!(path, attempt, "PUT");
            let response = self
                .request(Method::PUT, path)
                .await?
                .json(&body)
                .send()
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => return Ok(response.json().await?),
                StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        return Err(ArmError::Throttled { attempts: attempt });
                    }
                    let delay = self.retry.delay(attempt - 1);
                    tracing::warn!(
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "control plane is throttling, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => return Err(classify(path, response).await),
            }
        }
    }

    async fn delete(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(ArmError::Cancelled);
        }
        tracing::debug!(path, "DELETE");
        let response = self.request(Method::DELETE, path).await?.send().await?;
        match response.status() {
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(classify(path, response).await),
        }
    }

    async fn exists(&self, path: &str, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            return Err(ArmError::Cancelled);
        }
        tracing::debug!(path, "existence probe");
        let response = self.request(Method::GET, path).await?.send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(ArmError::Protocol {
                status: status.as_u16(),
                path: path.to_string(),
            }),
        }
    }
}
