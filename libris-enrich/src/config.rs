//! Runtime settings for the enrichment service
//!
//! Parses the shared TOML configuration into validated, duration-typed
//! settings at startup. A bad value fails boot instead of surfacing
//! mid-request.

use libris_common::config::TomlConfig;
use libris_common::time::parse_human_duration;
use libris_common::{Error, Result};
use std::time::Duration;

/// Credential reference: a direct value or an `env:VAR` indirection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef {
    Direct(String),
    Env(String),
}

impl SecretRef {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix("env:") {
            Some(var) => SecretRef::Env(var.to_string()),
            None => SecretRef::Direct(raw.to_string()),
        }
    }

    /// Resolve to the secret value. Env indirection that points at an
    /// unset variable is a configuration error.
    pub fn resolve(&self) -> Result<String> {
        match self {
            SecretRef::Direct(value) => Ok(value.clone()),
            SecretRef::Env(var) => std::env::var(var)
                .map_err(|_| Error::Config(format!("secret environment variable {var} not set"))),
        }
    }
}

/// Cache tier settings
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub edge_ttl: Duration,
    pub isbn_enrich_ttl: Duration,
    pub isbn_search_ttl: Duration,
    pub title_search_ttl: Duration,
    pub cover_ttl: Duration,
    pub ai_parse_ttl: Duration,
    pub quality_floor: u8,
    pub negative_ttl: Option<Duration>,
}

/// Provider client settings
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub timeout: Duration,
    pub google_books_api_key: Option<SecretRef>,
    pub isbndb_api_key: Option<SecretRef>,
    pub vision_api_key: Option<SecretRef>,
    pub open_library_base_url: String,
    pub google_books_base_url: String,
    pub isbndb_base_url: String,
    pub vision_base_url: String,
}

/// Admission control settings
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub requests_per_window: u32,
    pub window: Duration,
}

/// Batch job settings
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub token_lifetime: Duration,
    pub refresh_window: Duration,
    pub cleanup: Duration,
    pub persist_update_count: u32,
    pub persist_interval: Duration,
}

/// Validated service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub cache: CacheSettings,
    pub providers: ProviderSettings,
    pub rate_limit: RateLimitSettings,
    pub batch: BatchSettings,
    pub unified_envelope: bool,
}

const OPEN_LIBRARY_BASE_URL: &str = "https://openlibrary.org";
const GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com/books/v1";
const ISBNDB_BASE_URL: &str = "https://api2.isbndb.com";
const VISION_BASE_URL: &str = "https://vision.libris.invalid/v1";

impl Settings {
    pub fn from_toml(cfg: &TomlConfig) -> Result<Self> {
        let negative_ttl = match &cfg.cache.negative_ttl {
            Some(raw) => {
                let ttl = parse_human_duration(raw)?;
                if ttl > Duration::from_secs(60) {
                    return Err(Error::Config(
                        "cache.negative_ttl must not exceed 60s".to_string(),
                    ));
                }
                Some(ttl)
            }
            None => None,
        };

        Ok(Self {
            host: cfg.service.host.clone(),
            port: cfg.service.port,
            database_path: cfg.service.database_path.clone(),
            cache: CacheSettings {
                edge_ttl: parse_human_duration(&cfg.cache.edge_ttl)?,
                isbn_enrich_ttl: parse_human_duration(&cfg.cache.isbn_enrich_ttl)?,
                isbn_search_ttl: parse_human_duration(&cfg.cache.isbn_search_ttl)?,
                title_search_ttl: parse_human_duration(&cfg.cache.title_search_ttl)?,
                cover_ttl: parse_human_duration(&cfg.cache.cover_ttl)?,
                ai_parse_ttl: parse_human_duration(&cfg.cache.ai_parse_ttl)?,
                quality_floor: cfg.cache.quality_floor,
                negative_ttl,
            },
            providers: ProviderSettings {
                timeout: parse_human_duration(&cfg.providers.timeout)?,
                google_books_api_key: cfg
                    .providers
                    .google_books_api_key
                    .as_deref()
                    .map(SecretRef::parse),
                isbndb_api_key: cfg.providers.isbndb_api_key.as_deref().map(SecretRef::parse),
                vision_api_key: cfg.providers.vision_api_key.as_deref().map(SecretRef::parse),
                open_library_base_url: cfg
                    .providers
                    .open_library_base_url
                    .clone()
                    .unwrap_or_else(|| OPEN_LIBRARY_BASE_URL.to_string()),
                google_books_base_url: cfg
                    .providers
                    .google_books_base_url
                    .clone()
                    .unwrap_or_else(|| GOOGLE_BOOKS_BASE_URL.to_string()),
                isbndb_base_url: cfg
                    .providers
                    .isbndb_base_url
                    .clone()
                    .unwrap_or_else(|| ISBNDB_BASE_URL.to_string()),
                vision_base_url: cfg
                    .providers
                    .vision_base_url
                    .clone()
                    .unwrap_or_else(|| VISION_BASE_URL.to_string()),
            },
            rate_limit: RateLimitSettings {
                requests_per_window: cfg.rate_limit.requests_per_minute,
                window: Duration::from_secs(60),
            },
            batch: BatchSettings {
                token_lifetime: parse_human_duration(&cfg.batch.token_lifetime)?,
                refresh_window: parse_human_duration(&cfg.batch.refresh_window)?,
                cleanup: parse_human_duration(&cfg.batch.cleanup)?,
                persist_update_count: cfg.batch.persist_update_count,
                persist_interval: parse_human_duration(&cfg.batch.persist_time)?,
            },
            unified_envelope: cfg.features.unified_envelope,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default()).expect("compiled defaults must parse")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.cache.isbn_enrich_ttl, Duration::from_secs(365 * 86_400));
        assert_eq!(settings.cache.isbn_search_ttl, Duration::from_secs(7 * 86_400));
        assert_eq!(settings.providers.timeout, Duration::from_secs(5));
        assert_eq!(settings.batch.refresh_window, Duration::from_secs(1800));
        assert_eq!(settings.rate_limit.requests_per_window, 100);
        assert!(settings.cache.negative_ttl.is_none());
    }

    #[test]
    fn test_secret_ref_parse() {
        assert_eq!(
            SecretRef::parse("env:ISBNDB_KEY"),
            SecretRef::Env("ISBNDB_KEY".to_string())
        );
        assert_eq!(
            SecretRef::parse("abc123"),
            SecretRef::Direct("abc123".to_string())
        );
    }

    #[test]
    fn test_secret_ref_resolve_direct() {
        let secret = SecretRef::Direct("value".to_string());
        assert_eq!(secret.resolve().unwrap(), "value");
    }

    #[test]
    fn test_secret_ref_resolve_missing_env() {
        let secret = SecretRef::Env("LIBRIS_TEST_UNSET_VARIABLE".to_string());
        assert!(secret.resolve().is_err());
    }

    #[test]
    fn test_negative_ttl_bounded() {
        let mut cfg = TomlConfig::default();
        cfg.cache.negative_ttl = Some("90s".to_string());
        assert!(Settings::from_toml(&cfg).is_err());

        cfg.cache.negative_ttl = Some("45s".to_string());
        let settings = Settings::from_toml(&cfg).unwrap();
        assert_eq!(settings.cache.negative_ttl, Some(Duration::from_secs(45)));
    }
}
