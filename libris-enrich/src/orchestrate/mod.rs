//! Provider orchestration
//!
//! Fans a query out to the providers declared for its kind, normalizes
//! whatever came back inside the wall-clock budget, and merges the
//! survivors into one ranked list. Provider failures are values, never
//! exceptions; a fully failed fan-out yields an empty list plus the
//! aggregated failure.

pub mod merge;

pub use merge::merge_works;

use crate::metrics::{MetricEvent, MetricsSink};
use crate::normalize;
use crate::providers::{GoogleBooksClient, IsbndbClient, OpenLibraryClient, ProviderFailure};
use futures::future::{join_all, BoxFuture};
use libris_common::model::{ProviderName, Work};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum results for text searches
pub const DEFAULT_MAX_RESULTS: usize = 20;

/// One provider task in a fan-out
type ProviderTask = (
    ProviderName,
    BoxFuture<'static, Result<Vec<Work>, ProviderFailure>>,
);

/// Outcome of one orchestrated query
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    pub works: Vec<Work>,
    /// "orchestrated" when several providers contributed, otherwise the
    /// single contributing provider's name
    pub provider_label: String,
    pub failures: Vec<(ProviderName, ProviderFailure)>,
}

impl OrchestrationResult {
    /// Every declared provider failed
    pub fn all_failed(&self) -> bool {
        self.works.is_empty() && !self.failures.is_empty()
    }

    /// Every failure was an authoritative not-found
    pub fn all_not_found(&self) -> bool {
        self.all_failed() && self.failures.iter().all(|(_, f)| f.is_not_found())
    }

    /// Human-readable aggregation of the failures
    pub fn aggregate_failure(&self) -> String {
        self.failures
            .iter()
            .map(|(provider, failure)| format!("{provider}: {failure}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Parallel provider fan-out with merge and ranking
pub struct Orchestrator {
    open_library: Arc<OpenLibraryClient>,
    google_books: Arc<GoogleBooksClient>,
    isbndb: Option<Arc<IsbndbClient>>,
    metrics: MetricsSink,
    /// Wall-clock budget for one whole fan-out
    budget: Duration,
}

impl Orchestrator {
    pub fn new(
        open_library: Arc<OpenLibraryClient>,
        google_books: Arc<GoogleBooksClient>,
        isbndb: Option<Arc<IsbndbClient>>,
        metrics: MetricsSink,
        budget: Duration,
    ) -> Self {
        Self {
            open_library,
            google_books,
            isbndb,
            metrics,
            budget,
        }
    }

    fn open_library_isbn_task(&self, isbn: &str) -> ProviderTask {
        let client = self.open_library.clone();
        let isbn = isbn.to_string();
        (
            ProviderName::OpenLibrary,
            Box::pin(async move {
                client
                    .lookup_isbn(&isbn)
                    .await
                    .map(|r| normalize::open_library::normalize(&r, 5))
            }),
        )
    }

    fn google_books_isbn_task(&self, isbn: &str) -> ProviderTask {
        let client = self.google_books.clone();
        let isbn = isbn.to_string();
        (
            ProviderName::GoogleBooks,
            Box::pin(async move {
                client
                    .lookup_isbn(&isbn)
                    .await
                    .map(|r| normalize::google_books::normalize(&r))
            }),
        )
    }

    /// ISBN search: primary and secondary metadata providers
    pub async fn search_isbn(&self, isbn: &str) -> OrchestrationResult {
        self.run_fan_out(vec![
            self.open_library_isbn_task(isbn),
            self.google_books_isbn_task(isbn),
        ])
        .await
    }

    /// Full enrichment by ISBN: metadata providers plus the cover
    /// provider when configured
    pub async fn enrich_isbn(&self, isbn: &str) -> OrchestrationResult {
        let mut tasks = vec![
            self.open_library_isbn_task(isbn),
            self.google_books_isbn_task(isbn),
        ];

        if let Some(isbndb) = &self.isbndb {
            let client = isbndb.clone();
            let isbn = isbn.to_string();
            tasks.push((
                ProviderName::Isbndb,
                Box::pin(async move {
                    client
                        .lookup_isbn(&isbn)
                        .await
                        .map(|r| vec![normalize::isbndb::normalize(&r)])
                }),
            ));
        }

        self.run_fan_out(tasks).await
    }

    /// Cover lookup: the cover provider alone
    pub async fn cover_isbn(&self, isbn: &str) -> OrchestrationResult {
        let Some(isbndb) = &self.isbndb else {
            return OrchestrationResult {
                works: vec![],
                provider_label: "orchestrated".to_string(),
                failures: vec![(
                    ProviderName::Isbndb,
                    ProviderFailure::Network("cover provider not configured".to_string()),
                )],
            };
        };

        let client = isbndb.clone();
        let isbn = isbn.to_string();
        self.run_fan_out(vec![(
            ProviderName::Isbndb,
            Box::pin(async move {
                client
                    .lookup_isbn(&isbn)
                    .await
                    .map(|r| vec![normalize::isbndb::normalize(&r)])
            }),
        )])
        .await
    }

    /// Free-text title search
    pub async fn search_title(&self, query: &str, limit: usize) -> OrchestrationResult {
        let ol = self.open_library.clone();
        let gb = self.google_books.clone();
        let q_ol = query.to_string();
        let q_gb = query.to_string();

        self.run_fan_out(vec![
            (
                ProviderName::OpenLibrary,
                Box::pin(async move {
                    ol.search(&q_ol, Some("title"), limit)
                        .await
                        .map(|r| normalize::open_library::normalize(&r, limit))
                }),
            ),
            (
                ProviderName::GoogleBooks,
                Box::pin(async move {
                    gb.search(&format!("intitle:{q_gb}"), limit)
                        .await
                        .map(|r| normalize::google_books::normalize(&r))
                }),
            ),
        ])
        .await
    }

    /// Author search
    pub async fn search_author(&self, query: &str, limit: usize) -> OrchestrationResult {
        let ol = self.open_library.clone();
        let gb = self.google_books.clone();
        let q_ol = query.to_string();
        let q_gb = query.to_string();

        self.run_fan_out(vec![
            (
                ProviderName::OpenLibrary,
                Box::pin(async move {
                    ol.search(&q_ol, Some("author"), limit)
                        .await
                        .map(|r| normalize::open_library::normalize(&r, limit))
                }),
            ),
            (
                ProviderName::GoogleBooks,
                Box::pin(async move {
                    gb.search(&format!("inauthor:{q_gb}"), limit)
                        .await
                        .map(|r| normalize::google_books::normalize(&r))
                }),
            ),
        ])
        .await
    }

    /// Await all provider tasks within the budget, then merge.
    ///
    /// A task that outlives the budget is recorded as a Timeout failure;
    /// the others' partial results are still used.
    async fn run_fan_out(&self, tasks: Vec<ProviderTask>) -> OrchestrationResult {
        let budget = self.budget;
        let bounded = tasks.into_iter().map(|(provider, task)| async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(budget, task).await {
                Ok(result) => result,
                Err(_) => Err(ProviderFailure::Timeout),
            };
            (provider, result, started.elapsed())
        });

        let results = join_all(bounded).await;

        let mut provider_works: Vec<Vec<Work>> = Vec::new();
        let mut contributing: Vec<ProviderName> = Vec::new();
        let mut failures = Vec::new();

        for (provider, result, elapsed) in results {
            self.metrics.emit(MetricEvent::ProviderCall {
                provider,
                elapsed_ms: elapsed.as_millis() as u64,
                success: result.is_ok(),
            });

            match result {
                Ok(works) => {
                    if !works.is_empty() {
                        contributing.push(provider);
                        provider_works.push(works);
                    }
                }
                Err(failure) => {
                    tracing::warn!(
                        provider = %provider,
                        failure = %failure,
                        "Provider fan-out member failed"
                    );
                    failures.push((provider, failure));
                }
            }
        }

        let works = merge_works(provider_works);
        let provider_label = match contributing.as_slice() {
            [single] => single.to_string(),
            _ => "orchestrated".to_string(),
        };

        tracing::debug!(
            works = works.len(),
            failures = failures.len(),
            provider = %provider_label,
            "Fan-out complete"
        );

        OrchestrationResult {
            works,
            provider_label,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_failed_classification() {
        let result = OrchestrationResult {
            works: vec![],
            provider_label: "orchestrated".to_string(),
            failures: vec![
                (ProviderName::OpenLibrary, ProviderFailure::NotFound),
                (ProviderName::GoogleBooks, ProviderFailure::NotFound),
            ],
        };
        assert!(result.all_failed());
        assert!(result.all_not_found());

        let result = OrchestrationResult {
            works: vec![],
            provider_label: "orchestrated".to_string(),
            failures: vec![
                (ProviderName::OpenLibrary, ProviderFailure::NotFound),
                (ProviderName::GoogleBooks, ProviderFailure::Transient5xx(500)),
            ],
        };
        assert!(result.all_failed());
        assert!(!result.all_not_found());
    }

    #[test]
    fn test_aggregate_failure_names_providers() {
        let result = OrchestrationResult {
            works: vec![],
            provider_label: "orchestrated".to_string(),
            failures: vec![(ProviderName::OpenLibrary, ProviderFailure::Timeout)],
        };
        assert!(result.aggregate_failure().contains("openlibrary"));
    }
}
