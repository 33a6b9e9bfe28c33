//! Google Books API client
//!
//! Secondary metadata provider. An API key is optional for low request
//! volumes; when configured it is appended to every request.

use super::{
    build_http_client, classify_status, classify_transport, retry_after_secs, ProviderFailure,
};
use crate::config::ProviderSettings;
use serde::{Deserialize, Serialize};

/// Volume list response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GbVolumesResponse {
    #[serde(rename = "totalItems", default)]
    pub total_items: u64,
    #[serde(default)]
    pub items: Vec<GbVolume>,
}

/// One volume
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GbVolume {
    pub id: String,
    #[serde(rename = "volumeInfo")]
    pub volume_info: GbVolumeInfo,
}

/// Volume metadata
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GbVolumeInfo {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    #[serde(rename = "publishedDate")]
    pub published_date: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "industryIdentifiers", default)]
    pub industry_identifiers: Vec<GbIndustryIdentifier>,
    #[serde(rename = "pageCount")]
    pub page_count: Option<i32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(rename = "imageLinks")]
    pub image_links: Option<GbImageLinks>,
    pub language: Option<String>,
}

/// ISBN (or other identifier) entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GbIndustryIdentifier {
    #[serde(rename = "type")]
    pub identifier_type: String,
    pub identifier: String,
}

/// Cover image links
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GbImageLinks {
    pub thumbnail: Option<String>,
    #[serde(rename = "smallThumbnail")]
    pub small_thumbnail: Option<String>,
}

/// Google Books API client
pub struct GoogleBooksClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderFailure> {
        let api_key = match &settings.google_books_api_key {
            Some(secret) => Some(secret.resolve().map_err(|e| {
                tracing::error!(error = %e, "Google Books credential resolution failed");
                ProviderFailure::Unauthenticated
            })?),
            None => None,
        };

        Ok(Self {
            http_client: build_http_client(settings.timeout)?,
            base_url: settings.google_books_base_url.clone(),
            api_key,
        })
    }

    /// Search volumes with an arbitrary query expression
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<GbVolumesResponse, ProviderFailure> {
        let url = format!("{}/volumes", self.base_url);
        let max_results = limit.clamp(1, 40).to_string();

        let mut params: Vec<(&str, &str)> = vec![("q", query), ("maxResults", &max_results)];
        if let Some(key) = &self.api_key {
            params.push(("key", key));
        }

        tracing::debug!(query = %query, limit, "Querying Google Books");

        let response = self
            .http_client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let parsed: GbVolumesResponse = response
            .json()
            .await
            .map_err(|e| ProviderFailure::MalformedPayload(e.to_string()))?;

        tracing::debug!(
            total_items = parsed.total_items,
            returned = parsed.items.len(),
            "Google Books search complete"
        );

        Ok(parsed)
    }

    /// Lookup by ISBN using the fielded query form
    pub async fn lookup_isbn(&self, isbn: &str) -> Result<GbVolumesResponse, ProviderFailure> {
        self.search(&format!("isbn:{isbn}"), 5).await
    }
}
