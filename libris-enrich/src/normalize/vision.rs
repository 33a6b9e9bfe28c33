//! Vision candidate normalization
//!
//! Candidates from the AI provider are not canonical works; they are
//! inputs for the batch enrichment path. This module turns them into
//! the input strings a batch job consumes: an ISBN when the provider
//! read one off the spine, otherwise a title/author query.

use super::clean;
use crate::providers::vision::VisionResponse;

/// Minimum provider confidence for a candidate to be enqueued
const MIN_CONFIDENCE: f64 = 0.3;

/// Convert candidates into batch enrichment inputs.
///
/// Low-confidence and empty candidates are dropped; duplicates are
/// collapsed to the first occurrence.
pub fn to_batch_inputs(response: &VisionResponse) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut inputs = Vec::new();

    for candidate in &response.candidates {
        if candidate.confidence > 0.0 && candidate.confidence < MIN_CONFIDENCE {
            continue;
        }

        let input = if let Some(isbn) = clean(candidate.isbn.as_deref()) {
            isbn
        } else {
            let title = clean(candidate.title.as_deref());
            let author = clean(candidate.author.as_deref());
            match (title, author) {
                (Some(t), Some(a)) => format!("{t} {a}"),
                (Some(t), None) => t,
                (None, Some(a)) => a,
                (None, None) => continue,
            }
        };

        if seen.insert(input.to_lowercase()) {
            inputs.push(input);
        }
    }

    inputs
}
