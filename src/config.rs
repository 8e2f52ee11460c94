use crate::cache::DEFAULT_CACHE_TTL;
use crate::error::{LedgerError, Result};
use crate::metrics::RevenueClassifications;
use crate::period::{validate_start_month, DEFAULT_FINANCIAL_YEAR_START_MONTH};
use crate::tracker::CommitPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_ENDPOINT: &str = "LEDGER_ENDPOINT";
pub const ENV_TOKEN: &str = "LEDGER_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "LEDGER_TIMEOUT_SECS";
pub const ENV_FY_START_MONTH: &str = "LEDGER_FY_START_MONTH";
pub const ENV_REVENUE_CLASSES: &str = "LEDGER_REVENUE_CLASSES";
pub const ENV_CACHE_TTL_SECS: &str = "LEDGER_CACHE_TTL_SECS";
pub const ENV_COMMIT_POLICY: &str = "LEDGER_COMMIT_POLICY";

pub const DEFAULT_MAX_COMPARISON_PERIODS: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServiceConfig {
    pub endpoint: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ServiceConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bearer_token: None,
            request_timeout_secs: default_timeout_secs(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReportSettings {
    pub financial_year_start_month: u32,
    pub revenue_classifications: RevenueClassifications,
    pub cache_ttl_secs: u64,
    pub commit_policy: CommitPolicy,
    pub max_comparison_periods: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            financial_year_start_month: DEFAULT_FINANCIAL_YEAR_START_MONTH,
            revenue_classifications: RevenueClassifications::default(),
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            commit_policy: CommitPolicy::default(),
            max_comparison_periods: DEFAULT_MAX_COMPARISON_PERIODS,
        }
    }
}

impl ReportSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        validate_start_month(self.financial_year_start_month)?;
        if self.revenue_classifications.is_empty() {
            return Err(LedgerError::InvalidConfig(
                "revenue classification set is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Service connection plus report settings, read from a JSON file or `LEDGER_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub report: ReportSettings,
}

impl LedgerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `LEDGER_*` variables resolved by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENV_ENDPOINT)
            .ok_or_else(|| LedgerError::InvalidConfig(format!("{} is not set", ENV_ENDPOINT)))?;

        let mut service = ServiceConfig::new(endpoint);
        service.bearer_token = lookup(ENV_TOKEN).filter(|t| !t.trim().is_empty());
        if let Some(secs) = parse_var(&lookup, ENV_TIMEOUT_SECS)? {
            service.request_timeout_secs = secs;
        }

        let mut report = ReportSettings::default();
        if let Some(month) = parse_var(&lookup, ENV_FY_START_MONTH)? {
            report.financial_year_start_month = month;
        }
        if let Some(secs) = parse_var(&lookup, ENV_CACHE_TTL_SECS)? {
            report.cache_ttl_secs = secs;
        }
        if let Some(classes) = lookup(ENV_REVENUE_CLASSES) {
            report.revenue_classifications = RevenueClassifications::new(
                classes
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty()),
            );
        }
        if let Some(policy) = lookup(ENV_COMMIT_POLICY) {
            report.commit_policy = match policy.trim() {
                "advance_all" => CommitPolicy::AdvanceAll,
                "keep_failed" => CommitPolicy::KeepFailed,
                other => {
                    return Err(LedgerError::InvalidConfig(format!(
                        "{} must be 'advance_all' or 'keep_failed', got '{}'",
                        ENV_COMMIT_POLICY, other
                    )))
                }
            };
        }

        let config = Self { service, report };
        config.validate()?;
        Ok(config)
    }

    /// JSON schema of the configuration file.
    pub fn json_schema() -> Result<serde_json::Value> {
        let root = schemars::schema_for!(LedgerConfig);
        Ok(serde_json::to_value(root)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.endpoint.trim().is_empty() {
            return Err(LedgerError::InvalidConfig(
                "service endpoint is empty".to_string(),
            ));
        }
        self.report.validate()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            LedgerError::InvalidConfig(format!("{} has an invalid value '{}'", key, raw))
        }),
    }
}
