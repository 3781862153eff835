use anyhow::Result;
use std::sync::Arc;

use levelplay_mcp::{
    auth::{self, Credentials},
    config, http_client, middleware, routes, tools,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("🚀 LevelPlay MCP server starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );
    tracing::debug!("Configuration: {:?}", config);

    // One client for every outbound call, auth included
    let client = http_client::build_client(config.http_request_timeout)?;

    tracing::info!("Initializing authentication...");
    let credentials = Credentials::from_config(&config)?;
    let auth_manager = Arc::new(auth::AuthManager::new(
        client.clone(),
        config.auth_url(),
        credentials,
    ));

    // Test authentication by getting a token
    match auth_manager.get_token().await {
        Ok(_) => {
            tracing::info!("✅ Authentication successful");
        }
        Err(e) => {
            tracing::error!("❌ Authentication failed: {}", e);
            tracing::warn!(
                "Server will start but tool calls will fail until LevelPlay accepts the credentials"
            );
        }
    }

    let http_client = Arc::new(http_client::LevelPlayHttpClient::new(
        client,
        auth_manager.clone(),
    ));
    let tools = Arc::new(tools::LevelPlayTools::from_config(http_client, &config));
    tracing::info!("✅ LevelPlay tools initialized");

    let app_state = routes::AppState {
        proxy_api_key: config.proxy_api_key.clone(),
        auth_manager,
        tools,
    };

    // Build the application with routes and middleware
    let app = build_app(app_state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);

    // Start server with graceful shutdown
    tracing::info!("🚀 Server listening on http://{}/mcp", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    use axum::Router;

    // Health check routes (no auth required)
    let health_routes = routes::health_routes(state.clone());

    // MCP endpoint (with auth when configured)
    let mcp_routes = routes::mcp_routes(state);

    Router::new()
        .merge(health_routes)
        .merge(mcp_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
}

/// Print startup banner
fn print_startup_banner(config: &config::Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                  📊 LevelPlay MCP Server                  ║
║                                                           ║
║     Monetization reporting tools over streamable HTTP    ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Endpoint:    http://{}:{}/mcp",
        config.server_host, config.server_port
    );
    println!("  LevelPlay:   {}", config.base_url);
    println!(
        "  Client auth: {}",
        if config.proxy_api_key.is_some() {
            "API key required"
        } else {
            "open"
        }
    );
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
