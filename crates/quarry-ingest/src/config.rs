//! Source endpoints and credentials

use crate::error::{IngestError, Result};
use crate::manifest::SourceKind;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const DEFAULT_DATA_GOV_URL: &str = "https://catalog.data.gov";
pub const DEFAULT_FRED_URL: &str = "https://api.stlouisfed.org/fred";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Endpoint and HTTP settings for the source clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub data_gov_url: String,
    pub fred_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            data_gov_url: DEFAULT_DATA_GOV_URL.to_string(),
            fred_url: DEFAULT_FRED_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("quarry/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SourceConfig {
    /// Defaults overridden by `QUARRY_DATA_GOV_URL`, `QUARRY_FRED_URL` and
    /// `QUARRY_HTTP_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("QUARRY_DATA_GOV_URL") {
            config.data_gov_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var("QUARRY_FRED_URL") {
            config.fred_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(secs) = std::env::var("QUARRY_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                IngestError::config(format!("Invalid QUARRY_HTTP_TIMEOUT_SECS: {secs}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Build the shared HTTP client
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()?)
    }
}

/// API keys per source
///
/// Lookup order is explicit keys, then manifest `api_keys`, then the
/// `{SOURCE}_API_KEY` environment variable.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    explicit: HashMap<SourceKind, String>,
    manifest: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(manifest: BTreeMap<String, String>) -> Self {
        Self {
            explicit: HashMap::new(),
            manifest,
        }
    }

    /// Add a key that takes precedence over every other origin
    pub fn with_explicit(mut self, source: SourceKind, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.explicit.insert(source, key);
        }
        self
    }

    /// Resolve the key for a source, if any origin provides one
    pub fn get(&self, source: SourceKind) -> Option<String> {
        self.explicit
            .get(&source)
            .cloned()
            .or_else(|| self.manifest.get(source.as_str()).cloned())
            .or_else(|| std::env::var(source.api_key_env()).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Resolve the key for a source or fail with a configuration error
    pub fn require(&self, source: SourceKind) -> Result<String> {
        self.get(source).ok_or_else(|| {
            IngestError::config(format!(
                "{source} API key required. Set {} or pass --api-key",
                source.api_key_env()
            ))
        })
    }
}
