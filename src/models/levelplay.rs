use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ApiError, Result};
use crate::http_client::QueryParams;

pub const DEFAULT_METRICS: &str = "revenue,impressions,eCPM,activeUsers";
pub const DEFAULT_BREAKDOWNS: &str = "date";

const DATE_FORMAT: &str = "%Y-%m-%d";

// ==================================================================================================
// Report filters
// ==================================================================================================

/// Filter dimensions accepted by the reporting endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKey {
    AppKey,
    Country,
    AdFormat,
    AdNetwork,
    Platform,
    IsBidder,
    IsLevelPlayMediation,
    AbTest,
    MediationGroup,
    MediationAdUnitId,
}

impl FilterKey {
    pub const ALL: [FilterKey; 10] = [
        FilterKey::AppKey,
        FilterKey::Country,
        FilterKey::AdFormat,
        FilterKey::AdNetwork,
        FilterKey::Platform,
        FilterKey::IsBidder,
        FilterKey::IsLevelPlayMediation,
        FilterKey::AbTest,
        FilterKey::MediationGroup,
        FilterKey::MediationAdUnitId,
    ];

    /// Query parameter name
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::AppKey => "appKey",
            FilterKey::Country => "country",
            FilterKey::AdFormat => "adFormat",
            FilterKey::AdNetwork => "adNetwork",
            FilterKey::Platform => "platform",
            FilterKey::IsBidder => "isBidder",
            FilterKey::IsLevelPlayMediation => "isLevelPlayMediation",
            FilterKey::AbTest => "abTest",
            FilterKey::MediationGroup => "mediationGroup",
            FilterKey::MediationAdUnitId => "mediationAdUnitId",
        }
    }
}

/// Filter value as sent by MCP clients; rendered to a query string value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

pub type Filters = BTreeMap<FilterKey, FilterValue>;

// ==================================================================================================
// levelplay-report arguments
// ==================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Start date (YYYY-MM-DD)
    pub start_date: String,
    /// End date (YYYY-MM-DD)
    pub end_date: String,
    /// Comma-separated metrics
    #[serde(default = "default_metrics")]
    pub metrics: String,
    /// Comma-separated breakdowns
    #[serde(default = "default_breakdowns")]
    pub breakdowns: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Filters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_per_page: Option<u32>,
}

fn default_metrics() -> String {
    DEFAULT_METRICS.to_string()
}

fn default_breakdowns() -> String {
    DEFAULT_BREAKDOWNS.to_string()
}

impl ReportRequest {
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
            metrics: default_metrics(),
            breakdowns: default_breakdowns(),
            filters: None,
            page: None,
            results_per_page: None,
        }
    }

    /// Parse tool arguments
    pub fn from_arguments(arguments: serde_json::Value) -> Result<Self> {
        let request: Self = serde_json::from_value(arguments)
            .map_err(|e| ApiError::ValidationError(format!("Invalid levelplay-report arguments: {}", e)))?;
        request.validate()?;
        Ok(request)
    }

    /// Validate date format and non-empty metric lists
    pub fn validate(&self) -> Result<()> {
        let start = parse_date("start_date", &self.start_date)?;
        let end = parse_date("end_date", &self.end_date)?;
        if start > end {
            return Err(ApiError::ValidationError(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.metrics.trim().is_empty() {
            return Err(ApiError::ValidationError("metrics cannot be empty".to_string()));
        }
        if self.breakdowns.trim().is_empty() {
            return Err(ApiError::ValidationError("breakdowns cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Query parameters for the reporting endpoint
    ///
    /// Filters and pagination are only present when set.
    pub fn query_params(&self) -> QueryParams {
        let mut params = vec![
            ("startDate".to_string(), self.start_date.clone()),
            ("endDate".to_string(), self.end_date.clone()),
            ("metrics".to_string(), self.metrics.clone()),
            ("breakdowns".to_string(), self.breakdowns.clone()),
        ];

        if let Some(filters) = &self.filters {
            params.extend(
                filters
                    .iter()
                    .map(|(key, value)| (key.as_str().to_string(), value.to_string())),
            );
        }

        if let Some(page) = self.page {
            params.push(("page".to_string(), page.to_string()));
        }
        if let Some(results_per_page) = self.results_per_page {
            params.push(("resultsPerPage".to_string(), results_per_page.to_string()));
        }

        params
    }
}

/// Parse a `YYYY-MM-DD` date, rejecting unpadded fields such as `2024-1-1`
fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .filter(|date| date.format(DATE_FORMAT).to_string() == value)
        .ok_or_else(|| {
            ApiError::ValidationError(format!(
                "{} must be a date in YYYY-MM-DD format, got '{}'",
                field, value
            ))
        })
}
