//! Provider payload normalization
//!
//! Pure functions from provider response shapes into the canonical
//! Work/Edition/Author model. Nothing here performs I/O; equal inputs
//! always produce equal outputs, which is what makes normalized values
//! safe to cache and merge.

pub mod google_books;
pub mod isbndb;
pub mod open_library;
pub mod quality;
pub mod vision;

pub use quality::score_work;

/// Collapse null-ish provider strings to None.
///
/// Empty and whitespace-only values become None instead of surviving as
/// empty strings in canonical records.
pub(crate) fn clean(value: Option<&str>) -> Option<String> {
    match value {
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => None,
    }
}

/// Deduplicate while preserving first-seen order, case-insensitively.
pub(crate) fn dedup_ordered(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            out.push(trimmed);
        }
    }
    out
}
