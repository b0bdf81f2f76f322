use std::str::FromStr;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Address the WebSocket front door listens on.
    pub listen_addr: String,

    /// `Origin` values allowed to open a port.
    ///
    /// A `*.` host matches any subdomain. Handshakes from any other origin,
    /// or with no origin at all, are refused.
    pub allowed_origins: Vec<String>,

    // =========================
    // Bandcamp client
    // =========================
    /// Base URL for all API calls. Overridable for staging and tests.
    pub bandcamp_base_url: String,

    /// Value of the fan's `identity` cookie.
    ///
    /// The collection endpoints only answer for a logged-in fan, so hide,
    /// unhide and listing calls fail without it.
    pub bandcamp_identity: Option<String>,

    /// Per-request HTTP timeout. The backend adds no timeouts of its own.
    pub http_timeout: Duration,

    // =========================
    // Rate limiting
    // =========================
    /// Minimum spacing between the starts of two outbound API calls.
    ///
    /// Bandcamp throttles bursts from a single fan aggressively; two seconds
    /// keeps long hide/unhide runs under the radar.
    pub api_min_interval_ms: u64,

    /// Maximum number of API calls in flight at once.
    ///
    /// Default is 1: items are processed strictly one after another.
    pub api_max_concurrent: usize,

    // =========================
    // Batches
    // =========================
    /// Page size for collection listing requests.
    pub listing_page_size: usize,

    /// Pause after each cart add request so the page's cart updates do not race.
    pub cart_add_delay_ms: u64,

    // =========================
    // Downloads
    // =========================
    /// Size of one archive slice before base64 encoding.
    pub zip_chunk_bytes: usize,

    /// Number of files fetched concurrently while building an archive.
    pub download_batch_size: usize,

    /// Capacity of each port's outbound queue.
    ///
    /// Acts as backpressure when the client reads slower than we produce.
    pub port_queue_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8765".to_string(),
            allowed_origins: vec![
                "https://bandcamp.com".to_string(),
                "https://*.bandcamp.com".to_string(),
            ],
            bandcamp_base_url: "https://bandcamp.com".to_string(),
            bandcamp_identity: None,
            http_timeout: Duration::from_secs(30),
            api_min_interval_ms: 2_000,
            api_max_concurrent: 1,
            listing_page_size: 100,
            cart_add_delay_ms: 250,
            zip_chunk_bytes: 1024 * 1024,
            download_batch_size: 5,
            port_queue_capacity: 256,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let d = Self::default();

        Self {
            listen_addr: std::env::var("BES_LISTEN_ADDR").unwrap_or(d.listen_addr),
            allowed_origins: origins_from_env("BES_ALLOWED_ORIGINS").unwrap_or(d.allowed_origins),
            bandcamp_base_url: std::env::var("BANDCAMP_BASE_URL").unwrap_or(d.bandcamp_base_url),
            bandcamp_identity: std::env::var("BANDCAMP_IDENTITY").ok().filter(|v| !v.is_empty()),
            http_timeout: Duration::from_secs(env_or(
                "BES_HTTP_TIMEOUT_SECS",
                d.http_timeout.as_secs(),
            )),
            api_min_interval_ms: env_or("BES_API_MIN_INTERVAL_MS", d.api_min_interval_ms),
            api_max_concurrent: env_or("BES_API_MAX_CONCURRENT", d.api_max_concurrent).max(1),
            listing_page_size: env_or("BES_LISTING_PAGE_SIZE", d.listing_page_size).max(1),
            cart_add_delay_ms: env_or("BES_CART_ADD_DELAY_MS", d.cart_add_delay_ms),
            zip_chunk_bytes: env_or("BES_ZIP_CHUNK_BYTES", d.zip_chunk_bytes).max(1),
            download_batch_size: env_or("BES_DOWNLOAD_BATCH_SIZE", d.download_batch_size).max(1),
            port_queue_capacity: env_or("BES_PORT_QUEUE_CAPACITY", d.port_queue_capacity).max(8),
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            min_interval: Duration::from_millis(self.api_min_interval_ms),
            max_concurrent: self.api_max_concurrent,
        }
    }

    pub fn cart_add_delay(&self) -> Duration {
        Duration::from_millis(self.cart_add_delay_ms)
    }
}

/// Comma separated list; `None` when unset or empty.
fn origins_from_env(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let origins = parse_origins(&raw);
    if origins.is_empty() {
        tracing::warn!(key, "empty origin allowlist; using default");
        return None;
    }
    Some(origins)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_owned)
        .collect()
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "unparseable config value; using default");
            default
        }),
        Err(_) => default,
    }
}
