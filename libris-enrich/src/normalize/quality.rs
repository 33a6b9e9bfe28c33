//! Payload quality scoring
//!
//! Heuristic completeness score in [0, 100] for a canonical work.
//! Base 50, plus 20 for a cover URL, 10 for a usable synopsis, and 5
//! each for page count, publisher, subjects and authors. The unified
//! cache uses this as its write gate and the orchestrator as its field
//! preference order.

use libris_common::model::Work;

const BASE_SCORE: i32 = 50;
const COVER_BONUS: i32 = 20;
const SYNOPSIS_BONUS: i32 = 10;
const FIELD_BONUS: i32 = 5;
const MIN_SYNOPSIS_LEN: usize = 50;

/// Score a canonical work
pub fn score_work(work: &Work) -> u8 {
    let mut score = BASE_SCORE;

    let edition = work.editions.first();

    if edition
        .and_then(|e| e.cover_image_url.as_deref())
        .is_some()
    {
        score += COVER_BONUS;
    }

    if work
        .description
        .as_deref()
        .map(|d| d.len() >= MIN_SYNOPSIS_LEN)
        .unwrap_or(false)
    {
        score += SYNOPSIS_BONUS;
    }

    if edition.and_then(|e| e.page_count).map(|p| p > 0).unwrap_or(false) {
        score += FIELD_BONUS;
    }

    if edition.and_then(|e| e.publisher.as_deref()).is_some() {
        score += FIELD_BONUS;
    }

    if !work.subject_tags.is_empty() {
        score += FIELD_BONUS;
    }

    if !work.authors.is_empty() {
        score += FIELD_BONUS;
    }

    score.clamp(0, 100) as u8
}
