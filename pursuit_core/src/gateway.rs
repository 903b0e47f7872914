//! REST gateway client for simulation CRUD and lifecycle actions.
//!
//! Thin typed wrapper over the backend's `/api/v1` surface. Every
//! failure is normalized into an [`ApiError`] envelope, and transient
//! failures (network, timeout, 500, 503) are retried a bounded number of
//! times with exponential backoff.

use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use pursuit_env::ViewerContext;

use crate::endpoint::ServerEndpoint;
use crate::model::{NewSimulation, Simulation, SimulationUpdate, SnapshotRecord};

// ============================================================================
// ERROR ENVELOPE
// ============================================================================

/// Classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApiErrorKind {
    Auth,
    Permission,
    NotFound,
    Server,
    Unavailable,
    Network,
    Timeout,
    Request,
}

impl ApiErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::NotFound => "notFound",
            Self::Server => "server",
            Self::Unavailable => "unavailable",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Request => "request",
        }
    }

    /// Transient kinds worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Server | Self::Unavailable
        )
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized gateway error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message} (status {status}, request {request_id})")]
pub struct ApiError {
    /// HTTP status; 500 for transport-level failures with no response
    pub status: u16,
    pub message: String,
    pub kind: ApiErrorKind,
    /// Identifier generated per request, for correlating with logs
    pub request_id: String,
}

impl ApiError {
    /// Builds the envelope for an HTTP error status.
    ///
    /// Mapped statuses carry a canonical message; anything else keeps
    /// the backend's `detail` text and falls back to kind `request`.
    pub fn from_status(status: u16, detail: Option<String>, request_id: impl Into<String>) -> Self {
        let (kind, message) = match status {
            401 => (ApiErrorKind::Auth, "unauthorized, sign in and retry".to_string()),
            403 => (
                ApiErrorKind::Permission,
                "access to this resource is denied".to_string(),
            ),
            404 => (
                ApiErrorKind::NotFound,
                "the requested resource does not exist".to_string(),
            ),
            500 => (
                ApiErrorKind::Server,
                "server error, try again later".to_string(),
            ),
            503 => (
                ApiErrorKind::Unavailable,
                "service temporarily unavailable, try again later".to_string(),
            ),
            _ => (
                ApiErrorKind::Request,
                detail.unwrap_or_else(|| "unexpected error".to_string()),
            ),
        };
        Self {
            status,
            message,
            kind,
            request_id: request_id.into(),
        }
    }

    /// Network-level failure with no HTTP response.
    pub fn network(message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
            kind: ApiErrorKind::Network,
            request_id: request_id.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Retry/timeout tunables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub request_timeout: Duration,

    /// Extra attempts after the first failure
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            max_retries: 2,
        }
    }
}

/// Retry delay for the given attempt: 500ms, 1500ms, 3500ms, ...
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis((1u64 << attempt.min(20)) * 500 - 500)
}

/// Typed client for the simulation REST surface.
pub struct SimulationGateway<C: ViewerContext> {
    ctx: Arc<C>,
    client: Client,
    endpoint: ServerEndpoint,
    config: GatewayConfig,
}

impl<C: ViewerContext> SimulationGateway<C> {
    pub fn new(ctx: Arc<C>, endpoint: ServerEndpoint) -> Result<Self, ApiError> {
        Self::with_config(ctx, endpoint, GatewayConfig::default())
    }

    pub fn with_config(
        ctx: Arc<C>,
        endpoint: ServerEndpoint,
        config: GatewayConfig,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError {
                status: 500,
                message: format!("failed to build HTTP client: {e}"),
                kind: ApiErrorKind::Request,
                request_id: "startup".to_string(),
            })?;
        Ok(Self {
            ctx,
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    // === Operations ===

    /// All simulations known to the backend (reduced records).
    pub async fn list(&self) -> Result<Vec<Simulation>, ApiError> {
        self.with_retry("list", || self.get_json("/simulations/")).await
    }

    /// Full record for one simulation.
    pub async fn get(&self, id: u64) -> Result<Simulation, ApiError> {
        let path = format!("/simulations/{id}");
        self.with_retry("get", || self.get_json(&path)).await
    }

    /// Creates a simulation; returns its full record.
    pub async fn create(&self, new: &NewSimulation) -> Result<Simulation, ApiError> {
        self.with_retry("create", || self.post_json("/simulations/", Some(new)))
            .await
    }

    /// Updates a simulation's configuration; returns the full record.
    pub async fn update(&self, id: u64, patch: &SimulationUpdate) -> Result<Simulation, ApiError> {
        let path = format!("/simulations/{id}");
        self.with_retry("update", || self.put_json(&path, patch)).await
    }

    /// Deletes a simulation and its persisted agent state.
    pub async fn delete(&self, id: u64) -> Result<(), ApiError> {
        let path = format!("/simulations/{id}");
        self.with_retry("delete", || self.delete_path(&path)).await
    }

    pub async fn start(&self, id: u64) -> Result<(), ApiError> {
        let path = format!("/simulations/{id}/start");
        self.with_retry("start", || self.post_empty(&path)).await
    }

    pub async fn stop(&self, id: u64) -> Result<(), ApiError> {
        let path = format!("/simulations/{id}/stop");
        self.with_retry("stop", || self.post_empty(&path)).await
    }

    pub async fn reset(&self, id: u64) -> Result<(), ApiError> {
        let path = format!("/simulations/{id}/reset");
        self.with_retry("reset", || self.post_empty(&path)).await
    }

    /// Persisted step snapshots for one simulation.
    pub async fn snapshots(&self, id: u64) -> Result<Vec<SnapshotRecord>, ApiError> {
        let path = format!("/simulations/{id}/snapshots");
        self.with_retry("snapshots", || self.get_json(&path)).await
    }

    // === Retry decorator ===

    async fn with_retry<T, F, Fut>(&self, op: &str, call: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = retry_delay(attempt);
                debug!(op, attempt, ?delay, "retrying request");
                self.ctx.sleep(delay).await;
            }
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    warn!(op, attempt, %error, "request failed, will retry");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    // === Request plumbing ===

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.api_base(), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request_id = request_id();
        let result = self.client.get(self.url(path)).send().await;
        Self::into_json(result, &request_id).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let request_id = request_id();
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        Self::into_json(request.send().await, &request_id).await
    }

    async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request_id = request_id();
        let result = self.client.put(self.url(path)).json(body).send().await;
        Self::into_json(result, &request_id).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        let request_id = request_id();
        let result = self.client.post(self.url(path)).send().await;
        Self::into_ok(result, &request_id).await
    }

    async fn delete_path(&self, path: &str) -> Result<(), ApiError> {
        let request_id = request_id();
        let result = self.client.delete(self.url(path)).send().await;
        Self::into_ok(result, &request_id).await
    }

    async fn into_json<T: DeserializeOwned>(
        result: Result<Response, reqwest::Error>,
        request_id: &str,
    ) -> Result<T, ApiError> {
        let response = Self::check_status(result, request_id).await?;
        response.json::<T>().await.map_err(|e| ApiError {
            status: 500,
            message: format!("invalid response body: {e}"),
            kind: ApiErrorKind::Request,
            request_id: request_id.to_string(),
        })
    }

    async fn into_ok(
        result: Result<Response, reqwest::Error>,
        request_id: &str,
    ) -> Result<(), ApiError> {
        Self::check_status(result, request_id).await.map(|_| ())
    }

    async fn check_status(
        result: Result<Response, reqwest::Error>,
        request_id: &str,
    ) -> Result<Response, ApiError> {
        let response = result.map_err(|e| Self::transport_error(e, request_id))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        // FastAPI error bodies carry the reason under "detail".
        let detail = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_owned));
        Err(ApiError::from_status(status.as_u16(), detail, request_id))
    }

    fn transport_error(error: reqwest::Error, request_id: &str) -> ApiError {
        let (kind, message) = if error.is_timeout() {
            (
                ApiErrorKind::Timeout,
                "request timed out, try again later".to_string(),
            )
        } else if error.is_builder() {
            (
                ApiErrorKind::Request,
                format!("request configuration error: {error}"),
            )
        } else {
            (
                ApiErrorKind::Network,
                "network connection error, check your connection".to_string(),
            )
        };
        ApiError {
            status: 500,
            message,
            kind,
            request_id: request_id.to_string(),
        }
    }
}

/// 10-character lowercase alphanumeric request identifier.
fn request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pursuit_env::TokioContext;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (401, ApiErrorKind::Auth),
            (403, ApiErrorKind::Permission),
            (404, ApiErrorKind::NotFound),
            (500, ApiErrorKind::Server),
            (503, ApiErrorKind::Unavailable),
            (400, ApiErrorKind::Request),
            (422, ApiErrorKind::Request),
        ];
        for (status, kind) in cases {
            let error = ApiError::from_status(status, None, "req");
            assert_eq!(error.kind, kind, "status {status}");
            assert_eq!(error.status, status);
        }
    }

    #[test]
    fn test_unmapped_status_keeps_detail() {
        let error = ApiError::from_status(422, Some("bad payload".to_string()), "req");
        assert_eq!(error.message, "bad payload");

        let error = ApiError::from_status(422, None, "req");
        assert_eq!(error.message, "unexpected error");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ApiErrorKind::Network.is_retryable());
        assert!(ApiErrorKind::Timeout.is_retryable());
        assert!(ApiErrorKind::Server.is_retryable());
        assert!(ApiErrorKind::Unavailable.is_retryable());
        assert!(!ApiErrorKind::Auth.is_retryable());
        assert!(!ApiErrorKind::NotFound.is_retryable());
        assert!(!ApiErrorKind::Request.is_retryable());
    }

    #[test]
    fn test_retry_delay_sequence() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(1500));
        assert_eq!(retry_delay(3), Duration::from_millis(3500));
    }

    #[test]
    fn test_request_id_shape() {
        let id = request_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_kind_envelope_tokens() {
        assert_eq!(ApiErrorKind::NotFound.as_str(), "notFound");
        assert_eq!(
            serde_json::to_string(&ApiErrorKind::NotFound).unwrap(),
            r#""notFound""#
        );
        assert_eq!(ApiErrorKind::Auth.as_str(), "auth");
    }

    fn test_gateway() -> SimulationGateway<TokioContext> {
        SimulationGateway::new(TokioContext::shared(), ServerEndpoint::new("localhost"))
            .expect("client build")
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_retries_transient_errors() {
        let gateway = test_gateway();
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = gateway
            .with_retry("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(ApiError::network(format!("boom {n}"), "req")) }
            })
            .await;

        // 1 initial call + 2 retries, then the last error surfaces.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().kind, ApiErrorKind::Network);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_gives_up_on_permanent_errors() {
        let gateway = test_gateway();
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = gateway
            .with_retry("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::from_status(404, None, "req")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind, ApiErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_returns_first_success() {
        let gateway = test_gateway();
        let calls = AtomicU32::new(0);

        let result = gateway
            .with_retry("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 1 {
                        Err(ApiError::network("flaky", "req"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
