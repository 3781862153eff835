use anyhow::Context;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthManager;
use crate::error::{ApiError, Result};

/// Payload returned to callers when LevelPlay throttles a request
pub const RATE_LIMIT_MESSAGE: &str = "Rate limited (429). LevelPlay allows 8000 requests/hour.";

/// Query parameters in the order they are sent
pub type QueryParams = Vec<(String, String)>;

/// Result of an authenticated GET
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Parsed JSON body of a successful response
    Data(Value),
    /// LevelPlay answered 429
    RateLimited,
}

impl FetchOutcome {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchOutcome::RateLimited)
    }

    /// JSON handed back over the tool boundary
    pub fn into_value(self) -> Value {
        match self {
            FetchOutcome::Data(value) => value,
            FetchOutcome::RateLimited => json!({ "error": RATE_LIMIT_MESSAGE }),
        }
    }
}

/// Build the shared HTTP client used for every outbound call
pub fn build_client(request_timeout: u64) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(request_timeout))
        .build()
        .context("Failed to create HTTP client")
}

/// HTTP client for the LevelPlay API with bearer authentication
pub struct LevelPlayHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Authentication manager
    auth_manager: Arc<AuthManager>,
}

impl LevelPlayHttpClient {
    /// Create a new HTTP client
    pub fn new(client: Client, auth_manager: Arc<AuthManager>) -> Self {
        Self {
            client,
            auth_manager,
        }
    }

    /// GET `url` with a bearer token
    /// Automatically handles:
    /// - 401: refreshes the token and retries once, unless the token was
    ///   issued by this same call (one auth call per fetch)
    /// - 429: returns `FetchOutcome::RateLimited`
    pub async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<FetchOutcome> {
        let (token, refreshed) = self.auth_manager.acquire_token().await?;
        let mut response = self.send(url, params, &token, 1).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if refreshed {
                tracing::warn!(url = %url, "Received 401 for a just-issued token, not retrying");
            } else {
                tracing::warn!(url = %url, "Received 401, refreshing token and retrying...");
                let token = self.auth_manager.reauthenticate(&token).await?;
                response = self.send(url, params, &token, 2).await?;
            }
        }

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(url = %url, "LevelPlay rate limit reached");
            return Ok(FetchOutcome::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                url = %url,
                response_body = %error_text,
                "HTTP request failed with error response"
            );
            return Err(ApiError::UpstreamError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body = response.text().await.map_err(ApiError::transport)?;
        serde_json::from_str(&body)
            .map(FetchOutcome::Data)
            .map_err(|e| ApiError::ParseError(format!("Response from {} is not valid JSON: {}", url, e)))
    }

    /// Issue a single GET attempt
    async fn send(
        &self,
        url: &str,
        params: &[(String, String)],
        token: &str,
        attempt: u32,
    ) -> Result<Response> {
        tracing::debug!(url = %url, attempt, "Sending HTTP request");

        let response = self
            .client
            .get(url)
            .query(params)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                let err = ApiError::transport(e);
                tracing::warn!(url = %url, attempt, error = %err, "HTTP request error");
                err
            })?;

        tracing::debug!(status = %response.status(), attempt, "Received HTTP response");
        Ok(response)
    }
}
