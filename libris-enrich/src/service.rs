//! Read-path service facade
//!
//! Glues the unified cache to the orchestrator: one method per query
//! kind, each a cache read-through whose loader is the provider
//! fan-out. Both the HTTP search handlers and batch job workers run
//! through here, so a batch item benefits from the same caching and
//! coalescing as an interactive search.

use crate::cache::{CacheOutcome, LoadError, LoadedValue, QueryKind, UnifiedCache};
use crate::normalize;
use crate::orchestrate::{OrchestrationResult, Orchestrator};
use crate::providers::{ProviderFailure, VisionClient};
use async_trait::async_trait;
use libris_common::model::Work;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Cache-fronted book lookup service
pub struct BookService {
    cache: Arc<UnifiedCache>,
    orchestrator: Arc<Orchestrator>,
    vision: Option<Arc<VisionClient>>,
}

impl BookService {
    pub fn new(
        cache: Arc<UnifiedCache>,
        orchestrator: Arc<Orchestrator>,
        vision: Option<Arc<VisionClient>>,
    ) -> Self {
        Self {
            cache,
            orchestrator,
            vision,
        }
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    /// ISBN search through the cache
    pub async fn search_isbn(&self, isbn: &str) -> Result<CacheOutcome, LoadError> {
        let orchestrator = self.orchestrator.clone();
        let isbn_owned = isbn.to_string();
        self.cache
            .get_or_load(QueryKind::SearchIsbn, &[("isbn", isbn)], move || async move {
                into_loaded(orchestrator.search_isbn(&isbn_owned).await)
            })
            .await
    }

    /// Full enrichment by ISBN (adds the cover provider)
    pub async fn enrich_isbn(&self, isbn: &str) -> Result<CacheOutcome, LoadError> {
        let orchestrator = self.orchestrator.clone();
        let isbn_owned = isbn.to_string();
        self.cache
            .get_or_load(QueryKind::EnrichIsbn, &[("isbn", isbn)], move || async move {
                into_loaded(orchestrator.enrich_isbn(&isbn_owned).await)
            })
            .await
    }

    /// Cover lookup through the cache (cover provider only)
    pub async fn cover_isbn(&self, isbn: &str) -> Result<CacheOutcome, LoadError> {
        let orchestrator = self.orchestrator.clone();
        let isbn_owned = isbn.to_string();
        self.cache
            .get_or_load(QueryKind::Cover, &[("isbn", isbn)], move || async move {
                into_loaded(orchestrator.cover_isbn(&isbn_owned).await)
            })
            .await
    }

    /// Title search through the cache
    pub async fn search_title(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<CacheOutcome, LoadError> {
        let orchestrator = self.orchestrator.clone();
        let query_owned = query.to_string();
        let limit_str = limit.to_string();
        self.cache
            .get_or_load(
                QueryKind::SearchTitle,
                &[("q", query), ("maxresults", &limit_str)],
                move || async move {
                    into_loaded(orchestrator.search_title(&query_owned, limit).await)
                },
            )
            .await
    }

    /// Author search through the cache
    pub async fn search_author(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<CacheOutcome, LoadError> {
        let orchestrator = self.orchestrator.clone();
        let query_owned = query.to_string();
        let limit_str = limit.to_string();
        self.cache
            .get_or_load(
                QueryKind::SearchAuthor,
                &[("q", query), ("maxresults", &limit_str)],
                move || async move {
                    into_loaded(orchestrator.search_author(&query_owned, limit).await)
                },
            )
            .await
    }

    /// Parse raw CSV text into batch inputs via the AI provider.
    ///
    /// Cached content-addressed in the `ai` namespace so identical
    /// uploads don't hit the provider twice.
    pub async fn parse_csv(&self, csv: &str) -> Result<Vec<String>, LoadError> {
        let Some(vision) = &self.vision else {
            return Err(LoadError::Upstream(
                "vision provider is not configured".to_string(),
            ));
        };

        let digest = sha256_hex(csv.as_bytes());
        let vision = vision.clone();
        let csv_owned = csv.to_string();

        let outcome = self
            .cache
            .get_or_load(
                QueryKind::AiParse,
                &[("kind", "csv"), ("sha256", &digest)],
                move || async move {
                    let response = vision.parse_csv(&csv_owned).await.map_err(map_vision)?;
                    let inputs = normalize::vision::to_batch_inputs(&response);
                    Ok(LoadedValue {
                        value: serde_json::to_value(&inputs)
                            .map_err(|e| LoadError::Upstream(e.to_string()))?,
                        source: "vision".to_string(),
                        quality_score: if inputs.is_empty() { 0 } else { 80 },
                    })
                },
            )
            .await?;

        serde_json::from_value(outcome.value)
            .map_err(|e| LoadError::Upstream(format!("cached AI parse unreadable: {e}")))
    }

    /// Extract candidates from shelf photos via the AI provider.
    pub async fn scan_shelf(&self, images: Vec<Vec<u8>>) -> Result<Vec<String>, LoadError> {
        let Some(vision) = &self.vision else {
            return Err(LoadError::Upstream(
                "vision provider is not configured".to_string(),
            ));
        };

        let mut hasher = Sha256::new();
        for image in &images {
            hasher.update(image);
        }
        let digest = format!("{:x}", hasher.finalize());
        let vision = vision.clone();

        let outcome = self
            .cache
            .get_or_load(
                QueryKind::AiParse,
                &[("kind", "scan"), ("sha256", &digest)],
                move || async move {
                    let response = vision.scan_shelf(images).await.map_err(map_vision)?;
                    let inputs = normalize::vision::to_batch_inputs(&response);
                    Ok(LoadedValue {
                        value: serde_json::to_value(&inputs)
                            .map_err(|e| LoadError::Upstream(e.to_string()))?,
                        source: "vision".to_string(),
                        quality_score: if inputs.is_empty() { 0 } else { 80 },
                    })
                },
            )
            .await?;

        serde_json::from_value(outcome.value)
            .map_err(|e| LoadError::Upstream(format!("cached AI scan unreadable: {e}")))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn map_vision(failure: ProviderFailure) -> LoadError {
    match failure {
        ProviderFailure::NotFound => LoadError::NotFound("no candidates".to_string()),
        ProviderFailure::Timeout => LoadError::Deadline("vision provider".to_string()),
        other => LoadError::Upstream(other.to_string()),
    }
}

/// Convert a fan-out result into a cacheable loaded value
fn into_loaded(result: OrchestrationResult) -> Result<LoadedValue, LoadError> {
    if result.all_failed() {
        if result.all_not_found() {
            return Err(LoadError::NotFound("no provider has this record".to_string()));
        }
        if result
            .failures
            .iter()
            .all(|(_, f)| matches!(f, ProviderFailure::Timeout))
        {
            return Err(LoadError::Deadline(result.aggregate_failure()));
        }
        return Err(LoadError::Upstream(result.aggregate_failure()));
    }

    let quality_score = result
        .works
        .iter()
        .map(|w| w.quality_score)
        .max()
        .unwrap_or(0);

    let value = serde_json::to_value(&result.works)
        .map_err(|e| LoadError::Upstream(format!("unserializable works: {e}")))?;

    Ok(LoadedValue {
        value,
        source: result.provider_label,
        quality_score,
    })
}

/// Normalize an input into an ISBN when it is one
pub fn as_isbn(input: &str) -> Option<String> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    let is_isbn10 = cleaned.is_ascii()
        && cleaned.len() == 10
        && cleaned[..9].chars().all(|c| c.is_ascii_digit())
        && cleaned
            .chars()
            .last()
            .map(|c| c.is_ascii_digit() || c == 'X' || c == 'x')
            .unwrap_or(false);
    let is_isbn13 = cleaned.len() == 13 && cleaned.chars().all(|c| c.is_ascii_digit());

    if is_isbn10 || is_isbn13 {
        Some(cleaned.to_uppercase())
    } else {
        None
    }
}

/// Identifier reported for an enriched batch item
fn book_id_of(work: &Work) -> String {
    work.editions
        .first()
        .and_then(|e| e.isbn.clone())
        .or_else(|| work.provider_ids.values().next().cloned())
        .unwrap_or_else(|| work.title.clone())
}

#[async_trait]
impl crate::jobs::ItemEnricher for BookService {
    async fn enrich(&self, input: &str) -> Result<String, String> {
        let outcome = match as_isbn(input) {
            Some(isbn) => self.enrich_isbn(&isbn).await,
            None => self.search_title(input, 3).await,
        };

        match outcome {
            Ok(outcome) => {
                let works: Vec<Work> = serde_json::from_value(outcome.value)
                    .map_err(|_| "MALFORMED_PAYLOAD".to_string())?;
                match works.first() {
                    Some(work) => Ok(book_id_of(work)),
                    None => Err("NOT_FOUND".to_string()),
                }
            }
            Err(LoadError::NotFound(_)) => Err("NOT_FOUND".to_string()),
            Err(LoadError::Deadline(_)) => Err("TIMEOUT".to_string()),
            Err(LoadError::Upstream(_)) => Err("PROVIDER_FAILURE".to_string()),
        }
    }
}
