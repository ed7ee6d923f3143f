//! FRED (Federal Reserve Economic Data) client
//!
//! API documentation: <https://fred.stlouisfed.org/docs/api/fred/>

use super::{transport_error, DatasetSummary, FetchedContent};
use crate::error::{IngestError, Result};
use crate::manifest::SourceKind;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Largest page requested from `series/search` (the API allows 1000)
pub const PAGE_SIZE: usize = 100;

const SOURCE: SourceKind = SourceKind::Fred;

/// Series metadata from `series/search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FredSeries {
    pub id: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub frequency: Option<String>,
    pub units: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FredSeries {
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: Some(self.id.clone()),
            title: self.title.clone(),
            description: self.notes.clone(),
            resources: Vec::new(),
        }
    }
}

/// One observation; FRED reports missing values as `"."`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FredObservation {
    pub date: String,
    pub value: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    seriess: Vec<FredSeries>,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

/// Content stored for a FRED spec
#[derive(Debug, Serialize)]
struct SeriesBundle<'a> {
    series_id: &'a str,
    series_info: Option<FredSeries>,
    observations: Vec<FredObservation>,
}

/// Client for the FRED REST API
pub struct FredClient {
    client: Client,
    base_url: String,
}

impl FredClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// GET a JSON endpoint, surfacing `error_code` payloads as fetch errors
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        api_key: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", api_key), ("file_type", "json")])
            .query(params)
            .send()
            .await
            .map_err(transport_error(SOURCE))?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error(SOURCE))?;
        let value: Option<Value> = serde_json::from_slice(&body).ok();

        if let Some(error_code) = value.as_ref().and_then(|v| v.get("error_code")) {
            let message = value
                .as_ref()
                .and_then(|v| v.get("error_message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(IngestError::fetch(
                SOURCE.as_str(),
                format!("FRED API error {error_code}: {message}"),
            ));
        }

        if !status.is_success() {
            return Err(IngestError::fetch(
                SOURCE.as_str(),
                format!("HTTP {status} from {endpoint}"),
            ));
        }

        let value = value.ok_or_else(|| {
            IngestError::fetch(SOURCE.as_str(), format!("Invalid JSON from {endpoint}"))
        })?;
        serde_json::from_value(value).map_err(|e| {
            IngestError::fetch(SOURCE.as_str(), format!("Unexpected {endpoint} response: {e}"))
        })
    }

    /// One page of `series/search` results
    pub async fn search_page(
        &self,
        api_key: &str,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FredSeries>> {
        let response: SearchResponse = self
            .get(
                "series/search",
                api_key,
                &[
                    ("search_text", query.to_string()),
                    ("search_type", "full_text".to_string()),
                    ("offset", offset.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(response.seriess)
    }

    /// Search across pages until `limit` series or the results run out
    pub async fn search_series(
        &self,
        api_key: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<FredSeries>> {
        let mut series = Vec::new();

        loop {
            let page_size = match limit {
                Some(limit) if series.len() >= limit => break,
                Some(limit) => PAGE_SIZE.min(limit - series.len()),
                None => PAGE_SIZE,
            };

            let page = self.search_page(api_key, query, series.len(), page_size).await?;
            if page.is_empty() {
                break;
            }
            debug!(query, offset = series.len(), count = page.len(), "Fetched series page");
            series.extend(page);
        }

        if let Some(limit) = limit {
            series.truncate(limit);
        }
        Ok(series)
    }

    /// All observations of a series
    pub async fn observations(&self, api_key: &str, series_id: &str) -> Result<Vec<FredObservation>> {
        let response: ObservationsResponse = self
            .get(
                "series/observations",
                api_key,
                &[("series_id", series_id.to_string())],
            )
            .await?;
        Ok(response.observations)
    }

    /// Observations plus series metadata as one pretty JSON document
    pub async fn fetch_series(&self, api_key: &str, series_id: &str) -> Result<FetchedContent> {
        let observations = self.observations(api_key, series_id).await?;
        let series_info = self
            .search_page(api_key, series_id, 0, 1)
            .await?
            .into_iter()
            .next();

        let bundle = SeriesBundle {
            series_id,
            series_info,
            observations,
        };
        Ok(FetchedContent::json(serde_json::to_vec_pretty(&bundle)?))
    }
}
