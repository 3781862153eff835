// LevelPlay reporting tools exposed over MCP

use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::http_client::{FetchOutcome, LevelPlayHttpClient};
use crate::models::levelplay::{FilterKey, ReportRequest, DEFAULT_BREAKDOWNS, DEFAULT_METRICS};
use crate::models::mcp::ToolDefinition;

pub const REPORT_TOOL: &str = "levelplay-report";
pub const APPS_TOOL: &str = "levelplay-apps";

pub const SERVER_NAME: &str = "LevelPlay";

pub const SERVER_INSTRUCTIONS: &str = "LevelPlay ad monetization reporting server. \
Use levelplay-apps to discover app keys, \
then levelplay-report to query revenue, impressions, eCPM, and other metrics \
by date, app, country, ad format, ad network, and more. \
Dates are YYYY-MM-DD. Metrics and breakdowns are comma-separated strings.";

/// The two reporting tools bound to their endpoints
pub struct LevelPlayTools {
    http_client: Arc<LevelPlayHttpClient>,
    report_url: String,
    apps_url: String,
}

impl LevelPlayTools {
    pub fn new(http_client: Arc<LevelPlayHttpClient>, report_url: String, apps_url: String) -> Self {
        Self {
            http_client,
            report_url,
            apps_url,
        }
    }

    pub fn from_config(http_client: Arc<LevelPlayHttpClient>, config: &Config) -> Self {
        Self::new(http_client, config.report_url(), config.apps_url())
    }

    /// Query the monetization reporting API
    pub async fn report(&self, request: &ReportRequest) -> Result<FetchOutcome> {
        let params = request.query_params();
        tracing::info!(
            start_date = %request.start_date,
            end_date = %request.end_date,
            metrics = %request.metrics,
            breakdowns = %request.breakdowns,
            "Calling {}",
            REPORT_TOOL
        );
        self.http_client.fetch(&self.report_url, &params).await
    }

    /// List all apps on the account
    pub async fn apps(&self) -> Result<FetchOutcome> {
        tracing::info!("Calling {}", APPS_TOOL);
        self.http_client.fetch(&self.apps_url, &[]).await
    }

    /// Dispatch a `tools/call` by name
    ///
    /// Unknown tools and bad arguments are `ValidationError`s.
    pub async fn call(&self, name: &str, arguments: Option<Value>) -> Result<FetchOutcome> {
        match name {
            REPORT_TOOL => {
                let arguments = arguments.unwrap_or_else(|| json!({}));
                let request = ReportRequest::from_arguments(arguments)?;
                self.report(&request).await
            }
            APPS_TOOL => self.apps().await,
            other => Err(ApiError::ValidationError(format!("Unknown tool: {}", other))),
        }
    }
}

/// Definitions advertised by `tools/list`
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let filter_properties: serde_json::Map<String, Value> = FilterKey::ALL
        .iter()
        .map(|key| (key.as_str().to_string(), json!({ "type": ["string", "number", "boolean"] })))
        .collect();

    vec![
        ToolDefinition {
            name: REPORT_TOOL.to_string(),
            description: "Query the LevelPlay monetization reporting API.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "start_date": {
                        "type": "string",
                        "description": "Start date (YYYY-MM-DD)."
                    },
                    "end_date": {
                        "type": "string",
                        "description": "End date (YYYY-MM-DD)."
                    },
                    "metrics": {
                        "type": "string",
                        "description": format!("Comma-separated metrics (default: {}).", DEFAULT_METRICS),
                        "default": DEFAULT_METRICS
                    },
                    "breakdowns": {
                        "type": "string",
                        "description": format!("Comma-separated breakdowns (default: {}).", DEFAULT_BREAKDOWNS),
                        "default": DEFAULT_BREAKDOWNS
                    },
                    "filters": {
                        "type": "object",
                        "description": "Optional filters keyed by dimension.",
                        "properties": filter_properties,
                        "additionalProperties": false
                    },
                    "page": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Page number for pagination."
                    },
                    "results_per_page": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Results per page."
                    }
                },
                "required": ["start_date", "end_date"]
            }),
        },
        ToolDefinition {
            name: APPS_TOOL.to_string(),
            description: "List all apps on the LevelPlay account. Useful for discovering app keys."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}
