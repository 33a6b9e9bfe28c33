//! Open Library API client
//!
//! Primary metadata provider. Uses the public search endpoint for both
//! free-text and ISBN lookups; no credentials required.

use super::{
    build_http_client, classify_status, classify_transport, retry_after_secs, ProviderFailure,
};
use crate::config::ProviderSettings;
use serde::{Deserialize, Serialize};

/// Open Library search response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OlSearchResponse {
    #[serde(rename = "numFound", default)]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<OlDoc>,
}

/// One search result document
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OlDoc {
    /// Work key, e.g. "/works/OL82563W"
    pub key: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "author_name", default)]
    pub author_names: Vec<String>,
    #[serde(rename = "first_publish_year")]
    pub first_publish_year: Option<i32>,
    #[serde(rename = "isbn", default)]
    pub isbns: Vec<String>,
    #[serde(rename = "publisher", default)]
    pub publishers: Vec<String>,
    #[serde(rename = "publish_date", default)]
    pub publish_dates: Vec<String>,
    #[serde(rename = "language", default)]
    pub languages: Vec<String>,
    #[serde(rename = "subject", default)]
    pub subjects: Vec<String>,
    #[serde(rename = "number_of_pages_median")]
    pub number_of_pages_median: Option<i32>,
    /// Cover image id on covers.openlibrary.org
    #[serde(rename = "cover_i")]
    pub cover_id: Option<i64>,
    #[serde(rename = "first_sentence", default)]
    pub first_sentences: Vec<String>,
}

/// Open Library API client
pub struct OpenLibraryClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenLibraryClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderFailure> {
        Ok(Self {
            http_client: build_http_client(settings.timeout)?,
            base_url: settings.open_library_base_url.clone(),
        })
    }

    /// Free-text or fielded search
    pub async fn search(
        &self,
        query: &str,
        field: Option<&str>,
        limit: usize,
    ) -> Result<OlSearchResponse, ProviderFailure> {
        let q = match field {
            Some(field) => format!("{field}:{query}"),
            None => query.to_string(),
        };
        let url = format!("{}/search.json", self.base_url);

        tracing::debug!(query = %q, limit, "Querying Open Library");

        let response = self
            .http_client
            .get(&url)
            .query(&[("q", q.as_str()), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let parsed: OlSearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderFailure::MalformedPayload(e.to_string()))?;

        tracing::debug!(
            num_found = parsed.num_found,
            returned = parsed.docs.len(),
            "Open Library search complete"
        );

        Ok(parsed)
    }

    /// Lookup by ISBN, via the fielded search form
    pub async fn lookup_isbn(&self, isbn: &str) -> Result<OlSearchResponse, ProviderFailure> {
        self.search(isbn, Some("isbn"), 5).await
    }
}
