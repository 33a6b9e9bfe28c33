//! Canonical book domain model
//!
//! Work/Edition/Author DTOs shared by every provider normalizer and the
//! orchestrator. Provider-specific response shapes never leave their
//! client module; everything downstream speaks these types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// External metadata providers known to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    /// Primary metadata provider
    OpenLibrary,
    /// Secondary metadata provider
    GoogleBooks,
    /// Cover art and completeness provider
    Isbndb,
    /// AI vision / CSV parse provider
    Vision,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::OpenLibrary => "openlibrary",
            ProviderName::GoogleBooks => "googlebooks",
            ProviderName::Isbndb => "isbndb",
            ProviderName::Vision => "vision",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editorial review status of a canonical record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Unverified,
    Verified,
}

/// Physical/digital format of an edition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BookFormat {
    Hardcover,
    #[default]
    Paperback,
    #[serde(rename = "E-book")]
    Ebook,
    Audiobook,
}

impl BookFormat {
    /// Map a provider binding string to a canonical format.
    ///
    /// Case-insensitive substring match; unrecognized bindings fall back
    /// to Paperback.
    pub fn from_binding(binding: &str) -> Self {
        let b = binding.to_lowercase();
        const HARDCOVER: [&str; 3] = ["hardcover", "hardback", "library binding"];
        const PAPERBACK: [&str; 3] = ["paperback", "mass market", "trade paper"];
        const EBOOK: [&str; 3] = ["ebook", "kindle", "digital"];
        const AUDIOBOOK: [&str; 2] = ["audiobook", "audio cd"];

        if HARDCOVER.iter().any(|m| b.contains(m)) {
            BookFormat::Hardcover
        } else if PAPERBACK.iter().any(|m| b.contains(m)) {
            BookFormat::Paperback
        } else if EBOOK.iter().any(|m| b.contains(m)) {
            BookFormat::Ebook
        } else if AUDIOBOOK.iter().any(|m| b.contains(m)) {
            BookFormat::Audiobook
        } else {
            BookFormat::Paperback
        }
    }
}

/// Author gender, defaulting to Unknown when the provider says nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Unknown,
    Female,
    Male,
    NonBinary,
}

/// Canonical author record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub gender: Gender,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gender: Gender::Unknown,
        }
    }

    /// Deduplication key: case-folded name.
    pub fn dedup_key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Canonical edition record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Edition {
    /// Primary identifier; prefers ISBN-13 over ISBN-10
    pub isbn: Option<String>,
    /// All known ISBNs, ordered, deduplicated, empty values filtered
    pub isbns: Vec<String>,
    pub title: String,
    /// Present only when it differs from the work title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Original provider formatting is preserved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
    /// Preserved even when the provider reports zero or negative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i32>,
    #[serde(default)]
    pub format: BookFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition_description: Option<String>,
}

impl Edition {
    /// Install the ISBN set, enforcing the edition invariants:
    /// duplicates and empty values dropped, primary chosen 13-digit first.
    pub fn set_isbns<I, S>(&mut self, isbns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let mut clean: Vec<String> = Vec::new();
        for raw in isbns {
            let s: String = raw.into();
            let trimmed = s.trim().to_string();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.clone()) {
                clean.push(trimmed);
            }
        }

        self.isbn = clean
            .iter()
            .find(|i| i.len() == 13)
            .or_else(|| clean.first())
            .cloned();
        self.isbns = clean;
    }

    /// Dedup key for merging: primary ISBN when present, otherwise
    /// case-folded title.
    pub fn dedup_key(&self, primary_author: Option<&str>) -> String {
        match &self.isbn {
            Some(isbn) => format!("isbn:{isbn}"),
            None => format!(
                "ta:{}|{}",
                self.title.to_lowercase(),
                primary_author.unwrap_or("").to_lowercase()
            ),
        }
    }
}

/// Title sentinel applied when no provider knows a title
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Canonical work record with its editions and authors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_publication_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Empty when unknown, never absent
    pub subject_tags: Vec<String>,
    /// Provider names that contributed fields, in merge order
    pub contributors: Vec<ProviderName>,
    pub primary_provider: ProviderName,
    /// provider name -> that provider's native record id
    pub provider_ids: BTreeMap<ProviderName, String>,
    pub quality_score: u8,
    pub review_status: ReviewStatus,
    pub authors: Vec<Author>,
    pub editions: Vec<Edition>,
}

impl Work {
    /// Construct with invariants applied: non-empty title (sentinel
    /// fallback) and clamped quality score.
    pub fn new(title: Option<String>, primary_provider: ProviderName) -> Self {
        let title = match title {
            Some(t) if !t.trim().is_empty() => t,
            _ => UNKNOWN_TITLE.to_string(),
        };
        Self {
            title,
            original_language: None,
            first_publication_year: None,
            description: None,
            subject_tags: Vec::new(),
            contributors: vec![primary_provider],
            primary_provider,
            provider_ids: BTreeMap::new(),
            quality_score: 0,
            review_status: ReviewStatus::Unverified,
            authors: Vec::new(),
            editions: Vec::new(),
        }
    }

    pub fn set_quality_score(&mut self, score: i32) {
        self.quality_score = score.clamp(0, 100) as u8;
    }

    /// Name of the first credited author, used for edition dedup keys.
    pub fn primary_author(&self) -> Option<&str> {
        self.authors.first().map(|a| a.name.as_str())
    }
}

/// Extract a publication year from the first four digits of a date field.
///
/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD`; anything else yields None.
pub fn extract_year(date: &str) -> Option<i32> {
    let parts: Vec<&str> = date.trim().split('-').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    if parts[0].len() != 4 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    parts[0].parse().ok()
}
