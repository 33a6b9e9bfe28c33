//! Cache key derivation
//!
//! Canonicalizes a query kind plus parameters into a deterministic
//! string key. The function is pure and stable; any breaking change to
//! the canonical form must bump `FINGERPRINT_VERSION` so old entries
//! age out instead of being misread.

use unicode_normalization::UnicodeNormalization;

/// Version prefix on every key
pub const FINGERPRINT_VERSION: &str = "v1";

/// Query kinds with distinct cache policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    SearchIsbn,
    SearchTitle,
    SearchAuthor,
    EnrichIsbn,
    Cover,
    AiParse,
}

impl QueryKind {
    /// Kind segment of the fingerprint
    pub fn kind(&self) -> &'static str {
        match self {
            QueryKind::SearchIsbn | QueryKind::SearchTitle | QueryKind::SearchAuthor => "search",
            QueryKind::EnrichIsbn => "enrich",
            QueryKind::Cover => "cover",
            QueryKind::AiParse => "ai",
        }
    }

    /// Subkind segment of the fingerprint
    pub fn subkind(&self) -> &'static str {
        match self {
            QueryKind::SearchIsbn | QueryKind::EnrichIsbn => "isbn",
            QueryKind::SearchTitle => "title",
            QueryKind::SearchAuthor => "author",
            QueryKind::Cover => "cover",
            QueryKind::AiParse => "parse",
        }
    }

    /// True when parameter values are ISBNs (digits-only reduction)
    fn is_isbn(&self) -> bool {
        matches!(self, QueryKind::SearchIsbn | QueryKind::EnrichIsbn)
    }

    /// Configured KV TTL for this kind
    pub fn ttl(&self, cache: &crate::config::CacheSettings) -> std::time::Duration {
        match self {
            QueryKind::EnrichIsbn => cache.isbn_enrich_ttl,
            QueryKind::SearchIsbn => cache.isbn_search_ttl,
            QueryKind::SearchTitle | QueryKind::SearchAuthor => cache.title_search_ttl,
            QueryKind::Cover => cache.cover_ttl,
            QueryKind::AiParse => cache.ai_parse_ttl,
        }
    }
}

/// Normalize free text: NFC, lowercase, collapsed whitespace.
fn normalize_text(value: &str) -> String {
    let nfc: String = value.nfc().collect();
    nfc.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduce an ISBN to its digits
fn normalize_isbn(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Derive the cache key for a query.
///
/// `{version}:{kind}:{subkind}:{k1=v1&k2=v2}` with pairs sorted
/// lexicographically by parameter name.
pub fn fingerprint(kind: QueryKind, params: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| {
            let key = k.trim().to_lowercase();
            let value = if kind.is_isbn() && key == "isbn" {
                normalize_isbn(v)
            } else {
                normalize_text(v)
            };
            (key, value)
        })
        .collect();
    pairs.sort();

    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{FINGERPRINT_VERSION}:{}:{}:{joined}",
        kind.kind(),
        kind.subkind()
    )
}

/// URL form of a fingerprint, used as the edge tier key
pub fn edge_url(key: &str) -> String {
    let encoded: String = key
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | ':' | '=' | '&' | '.' | '-' | '_' => c.to_string(),
            other => format!("%{:02X}", other as u32),
        })
        .collect();
    format!("libris://edge/{encoded}")
}
