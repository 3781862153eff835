use anyhow::{Context, Result};
use clap::Parser;

/// Default LevelPlay platform host
pub const DEFAULT_BASE_URL: &str = "https://platform.ironsrc.com";

/// LevelPlay MCP Gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "FASTMCP_SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "FASTMCP_SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// LevelPlay secret key
    #[arg(long, env = "LEVELPLAY_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// LevelPlay refresh token
    #[arg(long, env = "LEVELPLAY_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// LevelPlay API base URL
    #[arg(long, env = "LEVELPLAY_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// API key required from MCP clients (open if unset)
    #[arg(short = 'k', long, env = "PROXY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Inbound authentication
    pub proxy_api_key: Option<String>,

    // LevelPlay credentials
    pub secret_key: String,
    pub refresh_token: String,
    pub base_url: String,

    // HTTP client
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("proxy_api_key", &self.proxy_api_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("http_request_timeout", &self.http_request_timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Config {
            server_host: args.host,
            server_port: args.port,

            proxy_api_key: args.api_key.filter(|k| !k.is_empty()),

            secret_key: args
                .secret_key
                .context("LEVELPLAY_SECRET_KEY is required (use --secret-key or set LEVELPLAY_SECRET_KEY env var)")?,

            refresh_token: args
                .refresh_token
                .context("LEVELPLAY_REFRESH_TOKEN is required (use --refresh-token or set LEVELPLAY_REFRESH_TOKEN env var)")?,

            base_url: args.base_url.trim_end_matches('/').to_string(),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.secret_key.trim().is_empty() {
            anyhow::bail!("LEVELPLAY_SECRET_KEY cannot be empty");
        }
        if self.refresh_token.trim().is_empty() {
            anyhow::bail!("LEVELPLAY_REFRESH_TOKEN cannot be empty");
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            anyhow::bail!(
                "LEVELPLAY_BASE_URL must be an http(s) URL: {}",
                self.base_url
            );
        }
        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }

        Ok(())
    }

    pub fn auth_url(&self) -> String {
        format!("{}/partners/publisher/auth", self.base_url)
    }

    pub fn report_url(&self) -> String {
        format!("{}/levelPlay/reporting/v1", self.base_url)
    }

    pub fn apps_url(&self) -> String {
        format!("{}/partners/publisher/applications/v6", self.base_url)
    }
}
