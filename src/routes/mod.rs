use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware::{self as axum_middleware},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthManager;
use crate::error::ApiError;
use crate::middleware;
use crate::models::mcp::{
    negotiate_protocol_version, CallToolParams, CallToolResult, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ServerInfo, JSONRPC_VERSION, SESSION_ID_HEADER,
};
use crate::tools::{tool_definitions, LevelPlayTools, SERVER_INSTRUCTIONS, SERVER_NAME};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub proxy_api_key: Option<String>,
    pub auth_manager: Arc<AuthManager>,
    pub tools: Arc<LevelPlayTools>,
}

/// Health check routes (no authentication required)
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// MCP streamable HTTP endpoint (requires authentication when configured)
pub fn mcp_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/mcp",
            post(mcp_handler)
                .get(method_not_allowed)
                .delete(method_not_allowed),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "LevelPlay MCP server is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
///
/// Reports whether a LevelPlay token is currently cached. Never triggers
/// authentication.
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let token_expires_at = state.auth_manager.expires_at().await;
    let authenticated = state.auth_manager.is_authenticated().await;

    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION,
        "authenticated": authenticated,
        "token_expires_at": token_expires_at,
    }))
}

/// GET|DELETE /mcp - server-initiated streams and session teardown are not offered
async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

/// POST /mcp - Handle one JSON-RPC message
async fn mcp_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Rejected MCP message with invalid JSON: {}", e);
            return rpc_response(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::parse_error(e),
            ));
        }
    };

    if message.is_array() {
        return rpc_response(JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::invalid_request("batch messages are not supported"),
        ));
    }

    // Responses to server requests carry no method; nothing to do with them
    if message.get("method").is_none()
        && (message.get("result").is_some() || message.get("error").is_some())
    {
        return StatusCode::ACCEPTED.into_response();
    }

    let mut request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            return rpc_response(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::invalid_request(e),
            ))
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return rpc_response(JsonRpcResponse::failure(
            request.id.unwrap_or(Value::Null),
            JsonRpcError::invalid_request(format!("unsupported jsonrpc version {}", request.jsonrpc)),
        ));
    }

    if request.is_notification() {
        tracing::debug!("Received notification: {}", request.method);
        return StatusCode::ACCEPTED.into_response();
    }
    let id = request.id.take().unwrap_or_default();

    tracing::info!("MCP request: method={}", request.method);

    match request.method.as_str() {
        "initialize" => initialize(id, request.params.as_ref()),
        "ping" => rpc_response(JsonRpcResponse::success(id, json!({}))),
        "tools/list" => rpc_response(JsonRpcResponse::success(
            id,
            json!({ "tools": tool_definitions() }),
        )),
        "tools/call" => call_tool(&state, id, request.params).await,
        other => rpc_response(JsonRpcResponse::failure(
            id,
            JsonRpcError::method_not_found(other),
        )),
    }
}

fn initialize(id: Value, params: Option<&Value>) -> Response {
    let result = InitializeResult {
        protocol_version: negotiate_protocol_version(params).to_string(),
        capabilities: json!({ "tools": { "listChanged": false } }),
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: VERSION.to_string(),
        },
        instructions: SERVER_INSTRUCTIONS.to_string(),
    };

    let result = match serde_json::to_value(&result) {
        Ok(value) => value,
        Err(e) => {
            return rpc_response(JsonRpcResponse::failure(id, JsonRpcError::internal_error(e)))
        }
    };

    let session_id = Uuid::new_v4().to_string();
    tracing::info!("MCP session initialized: {}", session_id);

    let mut response = rpc_response(JsonRpcResponse::success(id, result));
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

async fn call_tool(state: &AppState, id: Value, params: Option<Value>) -> Response {
    let params = match params
        .map(serde_json::from_value::<CallToolParams>)
        .transpose()
    {
        Ok(Some(params)) => params,
        Ok(None) => {
            return rpc_response(JsonRpcResponse::failure(
                id,
                JsonRpcError::invalid_params("tools/call requires params"),
            ))
        }
        Err(e) => {
            return rpc_response(JsonRpcResponse::failure(
                id,
                JsonRpcError::invalid_params(e),
            ))
        }
    };

    let result = match state.tools.call(&params.name, params.arguments).await {
        Ok(outcome) => CallToolResult::json(outcome.into_value()),
        Err(ApiError::ValidationError(msg)) => {
            tracing::warn!(tool = %params.name, "Rejected tool call: {}", msg);
            return rpc_response(JsonRpcResponse::failure(
                id,
                JsonRpcError::invalid_params(msg),
            ));
        }
        Err(e) => {
            tracing::error!(
                tool = %params.name,
                error_kind = e.kind(),
                error = %e,
                "Tool call failed"
            );
            CallToolResult::error(e.to_string())
        }
    };

    match serde_json::to_value(&result) {
        Ok(value) => rpc_response(JsonRpcResponse::success(id, value)),
        Err(e) => rpc_response(JsonRpcResponse::failure(id, JsonRpcError::internal_error(e))),
    }
}

fn rpc_response(response: JsonRpcResponse) -> Response {
    (StatusCode::OK, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{now_secs, Credentials};
    use crate::http_client::LevelPlayHttpClient;
    use axum::body::Body;
    use axum::http::Request;
    use reqwest::Client;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        let auth_manager = Arc::new(AuthManager::new(
            Client::new(),
            "http://127.0.0.1:1/partners/publisher/auth",
            Credentials::new("sk", "rt").unwrap(),
        ));
        let http_client = Arc::new(LevelPlayHttpClient::new(Client::new(), auth_manager.clone()));
        let tools = Arc::new(LevelPlayTools::new(
            http_client,
            "http://127.0.0.1:1/levelPlay/reporting/v1".to_string(),
            "http://127.0.0.1:1/partners/publisher/applications/v6".to_string(),
        ));
        AppState {
            proxy_api_key: None,
            auth_manager,
            tools,
        }
    }

    async fn post_mcp(body: &str) -> Response {
        mcp_routes(create_test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_handler() {
        let response = root_handler().await;
        assert_eq!(response.0["status"], "ok");
        assert_eq!(response.0["version"], VERSION);
    }

    #[tokio::test]
    async fn test_health_handler_without_token() {
        let response = health_handler(State(create_test_state())).await;
        assert_eq!(response.0["status"], "healthy");
        assert_eq!(response.0["authenticated"], false);
        assert!(response.0["token_expires_at"].is_null());
    }

    #[tokio::test]
    async fn test_health_matches_token_cache_at_expiry() {
        let seeded = |expires_at: f64| {
            let auth_manager = Arc::new(AuthManager::with_session(
                Client::new(),
                "http://127.0.0.1:1/partners/publisher/auth",
                Credentials::new("sk", "rt").unwrap(),
                "cached-token".to_string(),
                expires_at,
            ));
            AppState {
                auth_manager,
                ..create_test_state()
            }
        };

        // Expired by a fraction of a second: the cache would refresh
        let state = seeded(now_secs() - 0.5);
        assert!(!state.auth_manager.is_authenticated().await);
        let response = health_handler(State(state)).await;
        assert_eq!(response.0["authenticated"], false);

        let state = seeded(now_secs() + 600.0);
        let response = health_handler(State(state)).await;
        assert_eq!(response.0["authenticated"], true);
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let body = json_body(post_mcp("{not json").await).await;
        assert_eq!(body["error"]["code"], JsonRpcError::PARSE_ERROR);
        assert!(body["id"].is_null());
    }

    #[tokio::test]
    async fn test_batch_rejected() {
        let body = json_body(post_mcp(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).await).await;
        assert_eq!(body["error"]["code"], JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_method_is_invalid_request() {
        let body = json_body(post_mcp(r#"{"jsonrpc":"2.0","id":1}"#).await).await;
        assert_eq!(body["error"]["code"], JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version() {
        let body = json_body(post_mcp(r#"{"jsonrpc":"1.0","id":3,"method":"ping"}"#).await).await;
        assert_eq!(body["error"]["code"], JsonRpcError::INVALID_REQUEST);
        assert_eq!(body["id"], 3);
    }

    #[tokio::test]
    async fn test_notification_accepted() {
        let response =
            post_mcp(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_client_response_accepted() {
        let response = post_mcp(r#"{"jsonrpc":"2.0","id":9,"result":{}}"#).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_ping() {
        let body = json_body(post_mcp(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#).await).await;
        assert_eq!(body["id"], "p");
        assert_eq!(body["result"], json!({}));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let body =
            json_body(post_mcp(r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#).await)
                .await;
        assert_eq!(body["error"]["code"], JsonRpcError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_call_without_params() {
        let body =
            json_body(post_mcp(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call"}"#).await).await;
        assert_eq!(body["error"]["code"], JsonRpcError::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_get_not_allowed() {
        let response = mcp_routes(create_test_state())
            .oneshot(Request::builder().uri("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
