/// Configuration management for the Petgram client
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Hosted gateway connection
    pub gateway: GatewayConfig,
    /// Feed loading limits
    pub feed: FeedConfig,
    /// Debounce windows for search-as-you-type
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the hosted project
    pub url: String,
    /// Public anonymous API key
    pub anon_key: String,
    /// Storage bucket for post media and avatars
    #[serde(default = "default_media_bucket")]
    pub media_bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Posts per feed load
    #[serde(default = "default_feed_limit")]
    pub post_limit: usize,
    /// Comment rows fetched for previews across the whole page
    #[serde(default = "default_preview_fetch_limit")]
    pub preview_fetch_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_handle_debounce_ms")]
    pub handle_debounce_ms: u64,
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn handle_debounce(&self) -> Duration {
        Duration::from_millis(self.handle_debounce_ms)
    }
}

// Default values
fn default_media_bucket() -> String {
    "pet-media".to_string()
}

fn default_feed_limit() -> usize {
    30
}

fn default_preview_fetch_limit() -> usize {
    80
}

fn default_search_debounce_ms() -> u64 {
    350
}

fn default_handle_debounce_ms() -> u64 {
    300
}

fn env_or<T: std::str::FromStr>(name: &str, default: impl FnOnce() -> T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let gateway = GatewayConfig {
            url: std::env::var("PETGRAM_GATEWAY_URL")
                .context("PETGRAM_GATEWAY_URL environment variable not set")?,
            anon_key: std::env::var("PETGRAM_GATEWAY_ANON_KEY")
                .context("PETGRAM_GATEWAY_ANON_KEY environment variable not set")?,
            media_bucket: std::env::var("PETGRAM_MEDIA_BUCKET")
                .unwrap_or_else(|_| default_media_bucket()),
        };

        let feed = FeedConfig {
            post_limit: env_or("PETGRAM_FEED_LIMIT", default_feed_limit),
            preview_fetch_limit: env_or("PETGRAM_PREVIEW_FETCH_LIMIT", default_preview_fetch_limit),
        };

        let search = SearchConfig {
            debounce_ms: env_or("PETGRAM_SEARCH_DEBOUNCE_MS", default_search_debounce_ms),
            handle_debounce_ms: env_or("PETGRAM_HANDLE_DEBOUNCE_MS", default_handle_debounce_ms),
        };

        Ok(Config {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            gateway,
            feed,
            search,
        })
    }

    /// Defaults for everything except the gateway connection
    pub fn with_gateway(url: &str, anon_key: &str) -> Self {
        Config {
            env: "development".to_string(),
            gateway: GatewayConfig {
                url: url.to_string(),
                anon_key: anon_key.to_string(),
                media_bucket: default_media_bucket(),
            },
            feed: FeedConfig {
                post_limit: default_feed_limit(),
                preview_fetch_limit: default_preview_fetch_limit(),
            },
            search: SearchConfig {
                debounce_ms: default_search_debounce_ms(),
                handle_debounce_ms: default_handle_debounce_ms(),
            },
        }
    }
}
