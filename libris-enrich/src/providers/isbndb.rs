//! ISBNdb API client
//!
//! Cover art and completeness provider. Requires an API key sent in the
//! Authorization header; a missing key disables the client entirely
//! rather than producing guaranteed 401s at request time.

use super::{
    build_http_client, classify_status, classify_transport, retry_after_secs, ProviderFailure,
};
use crate::config::ProviderSettings;
use serde::{Deserialize, Serialize};

/// Book lookup response wrapper
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IsbndbBookResponse {
    pub book: IsbndbBook,
}

/// One book record
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IsbndbBook {
    pub title: Option<String>,
    #[serde(rename = "title_long")]
    pub title_long: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    #[serde(rename = "date_published")]
    pub date_published: Option<String>,
    pub pages: Option<i32>,
    /// Physical binding, e.g. "Mass Market Paperback"
    pub binding: Option<String>,
    /// Cover image URL
    pub image: Option<String>,
    pub synopsis: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub isbn: Option<String>,
    pub isbn13: Option<String>,
    pub language: Option<String>,
}

/// ISBNdb API client
pub struct IsbndbClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl IsbndbClient {
    /// Returns None when no API key is configured.
    pub fn new(settings: &ProviderSettings) -> Result<Option<Self>, ProviderFailure> {
        let Some(secret) = &settings.isbndb_api_key else {
            tracing::info!("ISBNdb API key not configured, cover provider disabled");
            return Ok(None);
        };

        let api_key = secret.resolve().map_err(|e| {
            tracing::error!(error = %e, "ISBNdb credential resolution failed");
            ProviderFailure::Unauthenticated
        })?;

        Ok(Some(Self {
            http_client: build_http_client(settings.timeout)?,
            base_url: settings.isbndb_base_url.clone(),
            api_key,
        }))
    }

    /// Lookup one book by ISBN
    pub async fn lookup_isbn(&self, isbn: &str) -> Result<IsbndbBookResponse, ProviderFailure> {
        let url = format!("{}/book/{}", self.base_url, isbn);

        tracing::debug!(isbn = %isbn, "Querying ISBNdb");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderFailure::MalformedPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_deserializes_from_api_shape() {
        let json = r#"{
            "book": {
                "title": "Neuromancer",
                "authors": ["William Gibson"],
                "publisher": "Ace Books",
                "date_published": "1984-07-01",
                "pages": 271,
                "binding": "Mass Market Paperback",
                "image": "https://images.isbndb.com/covers/neuromancer-L.jpg",
                "synopsis": "Case was the sharpest data-thief in the matrix, until he crossed the wrong people.",
                "subjects": ["Science fiction", "Cyberpunk"],
                "isbn": "0441569560",
                "isbn13": "9780441569564",
                "language": "en"
            }
        }"#;

        let parsed: IsbndbBookResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.book.binding.as_deref(), Some("Mass Market Paperback"));
        assert_eq!(parsed.book.pages, Some(271));
        assert_eq!(parsed.book.isbn13.as_deref(), Some("9780441569564"));
    }

    #[test]
    fn test_sparse_book_defaults() {
        let parsed: IsbndbBookResponse =
            serde_json::from_str(r#"{"book": {"title": "Bare"}}"#).unwrap();
        assert!(parsed.book.authors.is_empty());
        assert!(parsed.book.image.is_none());
    }
}
