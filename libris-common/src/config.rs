//! Configuration file loading
//!
//! TOML configuration resolved in priority order:
//! 1. Explicit path (command-line argument)
//! 2. `LIBRIS_CONFIG` environment variable
//! 3. `~/.config/libris/config.toml`, then `/etc/libris/config.toml`
//! 4. Compiled defaults
//!
//! Durations are written as human strings (`365d`, `6h`, `30min`, `5s`)
//! and parsed by the consuming service at startup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

fn default_database_path() -> String {
    "libris.db".to_string()
}

/// `[service]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: default_database_path(),
        }
    }
}

fn default_edge_ttl() -> String {
    "120s".to_string()
}

fn default_isbn_enrich_ttl() -> String {
    "365d".to_string()
}

fn default_isbn_search_ttl() -> String {
    "7d".to_string()
}

fn default_title_search_ttl() -> String {
    "6h".to_string()
}

fn default_cover_ttl() -> String {
    "30d".to_string()
}

fn default_ai_parse_ttl() -> String {
    "24h".to_string()
}

fn default_quality_floor() -> u8 {
    30
}

/// `[cache]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_edge_ttl")]
    pub edge_ttl: String,
    #[serde(default = "default_isbn_enrich_ttl")]
    pub isbn_enrich_ttl: String,
    #[serde(default = "default_isbn_search_ttl")]
    pub isbn_search_ttl: String,
    #[serde(default = "default_title_search_ttl")]
    pub title_search_ttl: String,
    #[serde(default = "default_cover_ttl")]
    pub cover_ttl: String,
    #[serde(default = "default_ai_parse_ttl")]
    pub ai_parse_ttl: String,
    /// Values scoring below this are never written to cache
    #[serde(default = "default_quality_floor")]
    pub quality_floor: u8,
    /// Bounded negative cache for hard not-found; absent disables it
    #[serde(default)]
    pub negative_ttl: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            edge_ttl: default_edge_ttl(),
            isbn_enrich_ttl: default_isbn_enrich_ttl(),
            isbn_search_ttl: default_isbn_search_ttl(),
            title_search_ttl: default_title_search_ttl(),
            cover_ttl: default_cover_ttl(),
            ai_parse_ttl: default_ai_parse_ttl(),
            quality_floor: default_quality_floor(),
            negative_ttl: None,
        }
    }
}

fn default_provider_timeout() -> String {
    "5s".to_string()
}

/// `[providers]` section
///
/// API keys accept either a direct value or an `env:VAR_NAME` indirection
/// resolved at client construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_provider_timeout")]
    pub timeout: String,
    #[serde(default)]
    pub google_books_api_key: Option<String>,
    #[serde(default)]
    pub isbndb_api_key: Option<String>,
    #[serde(default)]
    pub vision_api_key: Option<String>,
    /// Base URL overrides, used by tests and self-hosted mirrors
    #[serde(default)]
    pub open_library_base_url: Option<String>,
    #[serde(default)]
    pub google_books_base_url: Option<String>,
    #[serde(default)]
    pub isbndb_base_url: Option<String>,
    #[serde(default)]
    pub vision_base_url: Option<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout: default_provider_timeout(),
            google_books_api_key: None,
            isbndb_api_key: None,
            vision_api_key: None,
            open_library_base_url: None,
            google_books_base_url: None,
            isbndb_base_url: None,
            vision_base_url: None,
        }
    }
}

fn default_requests_per_minute() -> u32 {
    100
}

/// `[rate_limit]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_token_lifetime() -> String {
    "2h".to_string()
}

fn default_refresh_window() -> String {
    "30min".to_string()
}

fn default_cleanup() -> String {
    "24h".to_string()
}

fn default_persist_update_count() -> u32 {
    10
}

fn default_persist_time() -> String {
    "5s".to_string()
}

/// `[batch]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime: String,
    #[serde(default = "default_refresh_window")]
    pub refresh_window: String,
    #[serde(default = "default_cleanup")]
    pub cleanup: String,
    #[serde(default = "default_persist_update_count")]
    pub persist_update_count: u32,
    #[serde(default = "default_persist_time")]
    pub persist_time: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            token_lifetime: default_token_lifetime(),
            refresh_window: default_refresh_window(),
            cleanup: default_cleanup(),
            persist_update_count: default_persist_update_count(),
            persist_time: default_persist_time(),
        }
    }
}

fn default_unified_envelope() -> bool {
    true
}

/// `[features]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// When false, responses use the legacy bare-data body
    #[serde(default = "default_unified_envelope")]
    pub unified_envelope: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            unified_envelope: default_unified_envelope(),
        }
    }
}

/// Full TOML configuration file shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl TomlConfig {
    /// Load configuration following the documented priority order.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var("LIBRIS_CONFIG") {
            return Self::from_file(Path::new(&path));
        }

        for candidate in default_config_paths() {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Parse one TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse config {}: {}", path.display(), e)))
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("libris").join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/libris/config.toml"));
    paths
}
