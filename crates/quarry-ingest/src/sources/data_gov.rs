//! data.gov (CKAN) catalog client

use super::{transport_error, DatasetSummary, FetchedContent, ResourceRef};
use crate::error::{IngestError, Result};
use crate::manifest::{CatalogLocator, SourceKind};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Largest page requested from `package_search`
pub const PAGE_SIZE: usize = 100;

/// Resource formats tried, in order, when picking a file to download
pub const PREFERRED_FORMATS: [&str; 3] = ["CSV", "JSON", "XML"];

const SOURCE: SourceKind = SourceKind::DataGov;

#[derive(Debug, Deserialize)]
struct CkanResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    results: Vec<CkanPackage>,
}

/// A CKAN package; unknown fields are kept so it re-serializes in full
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CkanPackage {
    pub id: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub resources: Vec<CkanResource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A file attached to a CKAN package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CkanResource {
    pub url: Option<String>,
    pub format: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CkanPackage {
    /// First resource whose format is CSV, then JSON, then XML
    pub fn best_resource(&self) -> Option<&CkanResource> {
        PREFERRED_FORMATS.iter().find_map(|preferred| {
            self.resources.iter().find(|r| {
                r.format
                    .as_deref()
                    .is_some_and(|f| f.trim().eq_ignore_ascii_case(preferred))
            })
        })
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.name.clone().or_else(|| self.id.clone()),
            title: self.title.clone(),
            description: self.notes.clone(),
            resources: self
                .resources
                .iter()
                .map(|r| ResourceRef {
                    url: r.url.clone(),
                    format: r.format.clone(),
                })
                .collect(),
        }
    }
}

/// Client for the CKAN action API
pub struct DataGovClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DataGovClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send `X-Api-Key` with catalog requests
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/api/3/action/{}", self.base_url, action)
    }

    /// GET a catalog action; only these requests carry `X-Api-Key`
    async fn get_action(&self, action: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let mut request = self.client.get(self.action_url(action)).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }
        read_body(request, action).await
    }

    /// Raw `package_show` body for a package id or name
    pub async fn package_show(&self, dataset_id: &str) -> Result<Vec<u8>> {
        self.get_action("package_show", &[("id", dataset_id.to_string())])
            .await
    }

    /// One page of `package_search` results
    pub async fn search_page(&self, query: &str, start: usize, rows: usize) -> Result<Vec<CkanPackage>> {
        let body = self
            .get_action(
                "package_search",
                &[
                    ("q", query.to_string()),
                    ("start", start.to_string()),
                    ("rows", rows.to_string()),
                ],
            )
            .await?;

        let response: CkanResponse<SearchResult> = serde_json::from_slice(&body).map_err(|e| {
            IngestError::fetch(SOURCE.as_str(), format!("Invalid package_search response: {e}"))
        })?;

        if !response.success {
            let detail = response.error.map(|e| e.to_string()).unwrap_or_default();
            return Err(IngestError::fetch(
                SOURCE.as_str(),
                format!("CKAN API call failed: {detail}"),
            ));
        }

        Ok(response.result.map(|r| r.results).unwrap_or_default())
    }

    /// Search across pages until `limit` packages or the results run out
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<CkanPackage>> {
        let mut packages = Vec::new();

        loop {
            let rows = match limit {
                Some(limit) if packages.len() >= limit => break,
                Some(limit) => PAGE_SIZE.min(limit - packages.len()),
                None => PAGE_SIZE,
            };

            let page = self.search_page(query, packages.len(), rows).await?;
            if page.is_empty() {
                break;
            }
            debug!(query, start = packages.len(), count = page.len(), "Fetched search page");
            packages.extend(page);
        }

        if let Some(limit) = limit {
            packages.truncate(limit);
        }
        Ok(packages)
    }

    /// Download a resource file; resource hosts never see the catalog key
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        read_body(self.client.get(url), url).await
    }

    /// Fetch a manifest spec's content
    ///
    /// By id: the `package_show` body. By query: the best resource file of
    /// the first hit, or the package metadata when there is nothing to
    /// download.
    pub async fn fetch(&self, locator: &CatalogLocator) -> Result<FetchedContent> {
        match locator {
            CatalogLocator::DatasetId(dataset_id) => {
                Ok(FetchedContent::json(self.package_show(dataset_id).await?))
            }
            CatalogLocator::Query(query) => {
                let package = self
                    .search_page(query, 0, 1)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        IngestError::fetch(
                            SOURCE.as_str(),
                            format!("No datasets found for query: {query}"),
                        )
                    })?;

                let resource = package
                    .best_resource()
                    .and_then(|r| {
                        let url = r.url.as_deref().filter(|u| !u.trim().is_empty())?;
                        Some((url, r.format.as_deref()?))
                    });

                match resource {
                    Some((url, format)) => {
                        info!(url, format, "Downloading catalog resource");
                        Ok(FetchedContent::new(self.download(url).await?, format.trim()))
                    }
                    None => Ok(FetchedContent::json(serde_json::to_vec_pretty(&package)?)),
                }
            }
        }
    }
}

async fn read_body(request: reqwest::RequestBuilder, target: &str) -> Result<Vec<u8>> {
    let response = request.send().await.map_err(transport_error(SOURCE))?;
    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::fetch(
            SOURCE.as_str(),
            format!("HTTP {} from {}", status, target),
        ));
    }

    Ok(response
        .bytes()
        .await
        .map_err(transport_error(SOURCE))?
        .to_vec())
}
