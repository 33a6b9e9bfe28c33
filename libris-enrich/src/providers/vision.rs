//! AI vision / parse provider client
//!
//! Black-box endpoint that turns bookshelf photos or raw CSV text into
//! candidate book records. Prompting and model selection live on the
//! provider side; this client only ships bytes and receives candidates.

use super::{
    build_http_client, classify_status, classify_transport, retry_after_secs, ProviderFailure,
};
use crate::config::ProviderSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One candidate book extracted by the provider
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VisionCandidate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    /// Provider's confidence in this candidate, 0.0 - 1.0
    #[serde(default)]
    pub confidence: f64,
}

/// Candidate list response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VisionResponse {
    #[serde(default)]
    pub candidates: Vec<VisionCandidate>,
}

/// AI vision/parse client
pub struct VisionClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl VisionClient {
    /// Returns None when no API key is configured.
    pub fn new(settings: &ProviderSettings) -> Result<Option<Self>, ProviderFailure> {
        let Some(secret) = &settings.vision_api_key else {
            tracing::info!("Vision API key not configured, AI provider disabled");
            return Ok(None);
        };

        let api_key = secret.resolve().map_err(|e| {
            tracing::error!(error = %e, "Vision credential resolution failed");
            ProviderFailure::Unauthenticated
        })?;

        Ok(Some(Self {
            // Vision calls carry image payloads; allow a longer ceiling
            // than metadata lookups but still bounded.
            http_client: build_http_client(settings.timeout.max(Duration::from_secs(5)) * 4)?,
            base_url: settings.vision_base_url.clone(),
            api_key,
        }))
    }

    /// Extract candidate books from shelf photos
    pub async fn scan_shelf(
        &self,
        images: Vec<Vec<u8>>,
    ) -> Result<VisionResponse, ProviderFailure> {
        let url = format!("{}/scan", self.base_url);

        tracing::debug!(image_count = images.len(), "Submitting shelf scan");

        let mut form = reqwest::multipart::Form::new();
        for (index, image) in images.into_iter().enumerate() {
            form = form.part(
                format!("image{index}"),
                reqwest::multipart::Part::bytes(image).file_name(format!("shelf{index}.jpg")),
            );
        }

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport)?;

        self.parse_response(response).await
    }

    /// Extract candidate books from raw CSV text
    pub async fn parse_csv(&self, csv: &str) -> Result<VisionResponse, ProviderFailure> {
        let url = format!("{}/parse-csv", self.base_url);

        tracing::debug!(bytes = csv.len(), "Submitting CSV parse");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(csv.to_string())
            .send()
            .await
            .map_err(classify_transport)?;

        self.parse_response(response).await
    }

    async fn parse_response(
        &self,
        response: reqwest::Response,
    ) -> Result<VisionResponse, ProviderFailure> {
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
