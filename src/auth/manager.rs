use reqwest::Client;
use tokio::sync::{Mutex, RwLock};

use super::credentials::Credentials;
use super::jwt::decode_expiry;
use super::types::{token_preview, Session};
use crate::error::{ApiError, Result};

/// Authentication manager
/// Caches the LevelPlay bearer token and refreshes it on expiry or rejection
pub struct AuthManager {
    /// Current session, replaced as a whole on every refresh
    session: RwLock<Option<Session>>,

    /// Held for the duration of a refresh so concurrent callers share one auth call
    refresh_lock: Mutex<()>,

    /// Static secret key and refresh token
    credentials: Credentials,

    /// Auth endpoint URL
    auth_url: String,

    /// Shared HTTP client
    client: Client,
}

impl AuthManager {
    /// Create a new AuthManager with an empty session
    pub fn new(client: Client, auth_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            credentials,
            auth_url: auth_url.into(),
            client,
        }
    }

    /// Create an AuthManager with a pre-seeded session
    #[cfg(any(test, feature = "test-utils"))]
    pub fn with_session(
        client: Client,
        auth_url: impl Into<String>,
        credentials: Credentials,
        token: String,
        expires_at: f64,
    ) -> Self {
        Self {
            session: RwLock::new(Some(Session { token, expires_at })),
            ..Self::new(client, auth_url, credentials)
        }
    }

    /// Cached token if one exists and has not reached its expiry instant
    async fn cached_token(&self) -> Option<String> {
        let session = self.session.read().await;
        session
            .as_ref()
            .filter(|s| s.is_valid())
            .map(|s| s.token.clone())
    }

    /// Get a valid token, refreshing if necessary
    pub async fn get_token(&self) -> Result<String> {
        self.acquire_token().await.map(|(token, _)| token)
    }

    /// Like `get_token`, also reporting whether this call hit the auth endpoint
    pub async fn acquire_token(&self) -> Result<(String, bool)> {
        if let Some(token) = self.cached_token().await {
            return Ok((token, false));
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the guard
        if let Some(token) = self.cached_token().await {
            tracing::debug!("Using token refreshed by a concurrent caller");
            return Ok((token, false));
        }

        self.refresh_locked().await.map(|token| (token, true))
    }

    /// Unconditionally fetch a new token from the auth endpoint
    pub async fn authenticate(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Replace a token the API rejected
    ///
    /// If another caller already swapped in a different, still valid token
    /// while this one waited for the guard, that token is returned instead of
    /// authenticating again.
    pub async fn reauthenticate(&self, rejected: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        {
            let session = self.session.read().await;
            if let Some(current) = session.as_ref() {
                if current.token != rejected && current.is_valid() {
                    tracing::debug!("Rejected token already replaced by a concurrent caller");
                    return Ok(current.token.clone());
                }
            }
        }

        self.refresh_locked().await
    }

    /// Whether a cached token would be served without refreshing
    pub async fn is_authenticated(&self) -> bool {
        self.cached_token().await.is_some()
    }

    /// Expiry instant of the cached session, if any
    pub async fn expires_at(&self) -> Option<f64> {
        self.session.read().await.as_ref().map(|s| s.expires_at)
    }

    /// Call the auth endpoint and store the resulting session
    /// Caller must hold `refresh_lock`
    async fn refresh_locked(&self) -> Result<String> {
        tracing::debug!(url = %self.auth_url, "Requesting LevelPlay bearer token");

        let response = self
            .client
            .get(&self.auth_url)
            .header("secretkey", &self.credentials.secret_key)
            .header("refreshToken", &self.credentials.refresh_token)
            .send()
            .await
            .map_err(ApiError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                response_body = %message,
                "LevelPlay authentication failed"
            );
            return Err(ApiError::AuthError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(ApiError::transport)?;
        let token = clean_token(&body).to_string();
        let claim_exp = decode_expiry(&token)?;
        let session = Session::from_claim(token.clone(), claim_exp);

        tracing::info!(
            token = %token_preview(&token),
            expires_at = %format_instant(session.expires_at),
            "LevelPlay token refreshed"
        );

        *self.session.write().await = Some(session);

        Ok(token)
    }
}

/// Trim whitespace and one pair of enclosing double quotes
fn clean_token(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(trimmed)
}

fn format_instant(secs: f64) -> String {
    chrono::DateTime::from_timestamp(secs.floor() as i64, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::now_secs;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use mockito::Server;
    use serde_json::json;
    use std::sync::Arc;

    const AUTH_PATH: &str = "/partners/publisher/auth";

    fn token_expiring_at(exp: f64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp }).to_string());
        format!("eyJhbGciOiJIUzI1NiJ9.{}.c2ln", payload)
    }

    fn credentials() -> Credentials {
        Credentials::new("test-secret", "test-refresh").unwrap()
    }

    fn manager_for(server: &Server) -> AuthManager {
        AuthManager::new(
            Client::new(),
            format!("{}{}", server.url(), AUTH_PATH),
            credentials(),
        )
    }

    #[test]
    fn test_clean_token() {
        assert_eq!(clean_token("abc"), "abc");
        assert_eq!(clean_token("  abc\n"), "abc");
        assert_eq!(clean_token("\"abc\""), "abc");
        assert_eq!(clean_token(" \"abc\" \n"), "abc");
        // only one layer is removed
        assert_eq!(clean_token("\"\"abc\"\""), "\"abc\"");
        // unbalanced quotes are left alone
        assert_eq!(clean_token("\"abc"), "\"abc");
    }

    #[tokio::test]
    async fn test_authenticate_sends_credentials_in_headers() {
        let mut server = Server::new_async().await;
        let token = token_expiring_at(now_secs() + 3600.0);
        let mock = server
            .mock("GET", AUTH_PATH)
            .match_header("secretkey", "test-secret")
            .match_header("refreshToken", "test-refresh")
            .with_status(200)
            .with_body(format!("\"{}\"\n", token))
            .expect(1)
            .create_async()
            .await;

        let manager = manager_for(&server);
        let result = manager.authenticate().await.unwrap();

        assert_eq!(result, token);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expiry_is_claim_minus_margin() {
        let mut server = Server::new_async().await;
        let exp = now_secs() + 3600.0;
        let _mock = server
            .mock("GET", AUTH_PATH)
            .with_status(200)
            .with_body(token_expiring_at(exp))
            .create_async()
            .await;

        let manager = manager_for(&server);
        manager.authenticate().await.unwrap();

        assert_eq!(manager.expires_at().await, Some(exp - 60.0));
    }

    #[tokio::test]
    async fn test_get_token_uses_cache() {
        let mut server = Server::new_async().await;
        let token = token_expiring_at(now_secs() + 3600.0);
        let mock = server
            .mock("GET", AUTH_PATH)
            .with_status(200)
            .with_body(&token)
            .expect(1)
            .create_async()
            .await;

        let manager = manager_for(&server);
        let first = manager.authenticate().await.unwrap();
        let second = manager.get_token().await.unwrap();
        let third = manager.get_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_token_refreshes_inside_margin() {
        let mut server = Server::new_async().await;
        // Claim is 30s away, so the margin has already passed
        let token = token_expiring_at(now_secs() + 30.0);
        let mock = server
            .mock("GET", AUTH_PATH)
            .with_status(200)
            .with_body(&token)
            .expect(2)
            .create_async()
            .await;

        let manager = manager_for(&server);
        manager.authenticate().await.unwrap();
        manager.get_token().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_token_authenticates_when_empty() {
        let mut server = Server::new_async().await;
        let token = token_expiring_at(now_secs() + 3600.0);
        let mock = server
            .mock("GET", AUTH_PATH)
            .with_status(200)
            .with_body(&token)
            .expect(1)
            .create_async()
            .await;

        let manager = manager_for(&server);
        assert!(manager.expires_at().await.is_none());
        assert_eq!(manager.get_token().await.unwrap(), token);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_acquire_token_reports_refresh() {
        let mut server = Server::new_async().await;
        let token = token_expiring_at(now_secs() + 3600.0);
        let mock = server
            .mock("GET", AUTH_PATH)
            .with_status(200)
            .with_body(&token)
            .expect(1)
            .create_async()
            .await;

        let manager = manager_for(&server);
        assert!(!manager.is_authenticated().await);

        assert_eq!(manager.acquire_token().await.unwrap(), (token.clone(), true));
        assert_eq!(manager.acquire_token().await.unwrap(), (token, false));
        assert!(manager.is_authenticated().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_failure_carries_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", AUTH_PATH)
            .with_status(403)
            .with_body("invalid secret key")
            .create_async()
            .await;

        let manager = manager_for(&server);
        match manager.authenticate().await {
            Err(ApiError::AuthError { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "invalid secret key");
            }
            other => panic!("expected AuthError, got {:?}", other),
        }
        assert!(manager.expires_at().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_valid_session() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", AUTH_PATH)
            .with_status(500)
            .create_async()
            .await;

        let expires_at = now_secs() + 600.0;
        let manager = AuthManager::with_session(
            Client::new(),
            format!("{}{}", server.url(), AUTH_PATH),
            credentials(),
            "still-good".to_string(),
            expires_at,
        );

        assert!(manager.authenticate().await.is_err());
        assert_eq!(manager.get_token().await.unwrap(), "still-good");
        assert_eq!(manager.expires_at().await, Some(expires_at));
    }

    #[tokio::test]
    async fn test_undecodable_token_is_not_cached() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", AUTH_PATH)
            .with_status(200)
            .with_body("not-a-jwt")
            .create_async()
            .await;

        let manager = manager_for(&server);
        assert!(matches!(
            manager.authenticate().await,
            Err(ApiError::Decode(_))
        ));
        assert!(manager.expires_at().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_get_token_single_flight() {
        let mut server = Server::new_async().await;
        let token = token_expiring_at(now_secs() + 3600.0);
        let mock = server
            .mock("GET", AUTH_PATH)
            .with_status(200)
            .with_body(&token)
            .expect(1)
            .create_async()
            .await;

        let manager = Arc::new(manager_for(&server));
        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_token().await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap(), token);
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reauthenticate_reuses_replacement_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", AUTH_PATH)
            .expect(0)
            .create_async()
            .await;

        let manager = AuthManager::with_session(
            Client::new(),
            format!("{}{}", server.url(), AUTH_PATH),
            credentials(),
            "replacement".to_string(),
            now_secs() + 600.0,
        );

        let token = manager.reauthenticate("rejected").await.unwrap();
        assert_eq!(token, "replacement");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reauthenticate_refreshes_rejected_token() {
        let mut server = Server::new_async().await;
        let fresh = token_expiring_at(now_secs() + 3600.0);
        let mock = server
            .mock("GET", AUTH_PATH)
            .with_status(200)
            .with_body(&fresh)
            .expect(1)
            .create_async()
            .await;

        let manager = AuthManager::with_session(
            Client::new(),
            format!("{}{}", server.url(), AUTH_PATH),
            credentials(),
            "revoked".to_string(),
            now_secs() + 600.0,
        );

        assert_eq!(manager.reauthenticate("revoked").await.unwrap(), fresh);
        assert_eq!(manager.get_token().await.unwrap(), fresh);
        mock.assert_async().await;
    }
}
