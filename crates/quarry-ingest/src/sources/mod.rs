//! Upstream source clients
//!
//! The runner only sees the [`Fetcher`] trait. [`SourceFetcher`] dispatches a
//! spec's locator to the matching client with resolved credentials.

pub mod data_gov;
pub mod fred;

pub use data_gov::{CkanPackage, CkanResource, DataGovClient};
pub use fred::{FredClient, FredObservation, FredSeries};

use crate::config::{Credentials, SourceConfig};
use crate::error::{IngestError, Result};
use crate::manifest::{DatasetSpec, Locator, SourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw bytes returned by a fetch plus the format they are in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub bytes: Vec<u8>,
    /// Lowercase format hint (`json`, `csv`, ...)
    pub format: String,
}

impl FetchedContent {
    pub fn new(bytes: impl Into<Vec<u8>>, format: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            format: format.into().to_lowercase(),
        }
    }

    pub fn json(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes, "json")
    }
}

/// Fetch strategy for dataset specs
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, spec: &DatasetSpec) -> Result<FetchedContent>;
}

/// A downloadable file attached to a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub url: Option<String>,
    pub format: Option<String>,
}

/// Catalog entry as written by `quarry fetch`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceRef>,
}

/// Map a transport error onto a per-source fetch error
///
/// The request URL is dropped from the message since it can carry an API key.
pub(crate) fn transport_error(source: SourceKind) -> impl Fn(reqwest::Error) -> IngestError {
    move |e| IngestError::fetch(source.as_str(), e.without_url().to_string())
}

/// Dispatches specs to the data.gov and FRED clients
pub struct SourceFetcher {
    data_gov: DataGovClient,
    fred: FredClient,
    credentials: Credentials,
}

impl SourceFetcher {
    pub fn new(config: &SourceConfig, credentials: Credentials) -> Result<Self> {
        let client = config.http_client()?;

        Ok(Self {
            data_gov: DataGovClient::new(client.clone(), &config.data_gov_url)
                .with_api_key(credentials.get(SourceKind::DataGov)),
            fred: FredClient::new(client, &config.fred_url),
            credentials,
        })
    }
}

#[async_trait]
impl Fetcher for SourceFetcher {
    async fn fetch(&self, spec: &DatasetSpec) -> Result<FetchedContent> {
        match &spec.locator {
            Locator::Catalog(locator) => self.data_gov.fetch(locator).await,
            Locator::Fred { series_id } => {
                let api_key = self.credentials.require(SourceKind::Fred)?;
                self.fred.fetch_series(&api_key, series_id).await
            }
        }
    }
}
