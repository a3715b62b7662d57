use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

use crate::sources;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub host: String,

    // Upstream fetching
    pub user_agent: String,
    pub fetch_timeout_ms: u64,
    pub guide_timeout_ms: u64,
    pub fetch_retries: u32,

    // Cache TTLs
    pub playlist_ttl_ms: i64,
    pub curated_ttl_ms: i64,
    pub guide_ttl_ms: i64,
    pub extras_ttl_ms: i64,

    // Catalog behavior
    pub catalog_guide_soft_timeout_ms: u64,

    // Sources
    pub extras_url: String,

    // Admin / maintenance
    pub admin_key: String,
    pub cleanup_interval_secs: u64,
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// Every variable has a default; a variable that is set but malformed
    /// is a startup error, never a silent fallback.
    pub fn from_env() -> Result<Self> {
        let extras_url =
            env::var("EXTRAS_URL").unwrap_or_else(|_| sources::EXTRAS_DEFAULT_URL.to_string());
        url::Url::parse(&extras_url)
            .with_context(|| format!("invalid EXTRAS_URL: {:?}", extras_url))?;

        Ok(Self {
            // Server
            port: parsed_var("PORT", 7055)?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            // Upstream fetching - VLC user agent avoids upstream blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),
            fetch_timeout_ms: parsed_var("FETCH_TIMEOUT_MS", 15_000)?,
            guide_timeout_ms: parsed_var("GUIDE_TIMEOUT_MS", 90_000)?, // shards run to tens of MB
            fetch_retries: parsed_var("FETCH_RETRIES", 1)?,

            // Cache TTLs
            playlist_ttl_ms: parsed_var("PLAYLIST_TTL_MS", 900_000)?, // 15 minutes
            curated_ttl_ms: parsed_var("CURATED_TTL_MS", 1_200_000)?, // 20 minutes
            guide_ttl_ms: parsed_var("GUIDE_TTL_MS", 86_400_000)?,    // 24 hours
            extras_ttl_ms: parsed_var("EXTRAS_TTL_MS", 90_000)?, // tokenized URLs expire fast

            // Catalog behavior
            catalog_guide_soft_timeout_ms: parsed_var("CATALOG_GUIDE_SOFT_TIMEOUT_MS", 8_000)?,

            // Sources
            extras_url,

            // Admin / maintenance
            admin_key: env::var("ADMIN_KEY").unwrap_or_else(|_| "admin123".to_string()),
            cleanup_interval_secs: parsed_var("CLEANUP_INTERVAL_SECS", 3600)?,
        })
    }
}
