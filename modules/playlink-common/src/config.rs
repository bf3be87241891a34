use std::env;
use std::time::Duration;

/// Resolution pipeline policy. Literal defaults match the upstream ecosystem
/// these extractors target; every value can be overridden via environment.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Per-request budget for the static page fetch.
    pub fetch_timeout: Duration,
    /// Full resolve rounds before giving up.
    pub max_attempts: u32,
    /// Delay between resolve rounds.
    pub retry_backoff: Duration,
    /// Below this many accumulated links, the rendered extraction runs too.
    pub dynamic_threshold: usize,
    /// At or above this many accumulated links, retrying stops.
    pub min_results: usize,
    /// Server-name fragments, best first. Drives candidate allow-listing and
    /// result ordering.
    pub preferred_servers: Vec<String>,
    /// Navigation budget for a rendering session.
    pub nav_timeout_ms: u64,
    /// Settle time after a call-to-action click.
    pub click_settle: Duration,
    /// Settle time for client-side redirects before collecting the DOM.
    pub render_settle: Duration,
    /// Simultaneous rendering sessions. Each costs hundreds of MB.
    pub max_concurrent_renders: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(20),
            max_attempts: 2,
            retry_backoff: Duration::from_secs(2),
            dynamic_threshold: 2,
            min_results: 1,
            preferred_servers: vec![
                "pixel".to_string(),
                "fsl".to_string(),
                "10gbps".to_string(),
                "server".to_string(),
            ],
            nav_timeout_ms: 20_000,
            click_settle: Duration::from_millis(1_500),
            render_settle: Duration::from_millis(2_000),
            max_concurrent_renders: 2,
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fetch_timeout: Duration::from_secs(env_u64(
                "PLAYLINK_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )),
            max_attempts: env_u64("PLAYLINK_MAX_ATTEMPTS", defaults.max_attempts as u64) as u32,
            retry_backoff: Duration::from_secs(env_u64(
                "PLAYLINK_RETRY_BACKOFF_SECS",
                defaults.retry_backoff.as_secs(),
            )),
            dynamic_threshold: env_usize("PLAYLINK_DYNAMIC_THRESHOLD", defaults.dynamic_threshold),
            min_results: env_usize("PLAYLINK_MIN_RESULTS", defaults.min_results),
            preferred_servers: env_list("PLAYLINK_PREFERRED_SERVERS", defaults.preferred_servers),
            nav_timeout_ms: env_u64("PLAYLINK_NAV_TIMEOUT_MS", defaults.nav_timeout_ms),
            click_settle: defaults.click_settle,
            render_settle: defaults.render_settle,
            max_concurrent_renders: env_usize(
                "PLAYLINK_MAX_CONCURRENT_RENDERS",
                defaults.max_concurrent_renders,
            ),
        }
    }
}

/// Cache write policy.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// Lifetime of a cache entry from its last write.
    pub ttl_secs: i64,
    /// Below this many total servers, callers are told a refresh is needed.
    pub min_servers: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            min_servers: 9,
        }
    }
}

impl CachePolicy {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl_secs: env_u64("PLAYLINK_CACHE_TTL_SECS", defaults.ttl_secs as u64) as i64,
            min_servers: env_usize("PLAYLINK_MIN_SERVERS", defaults.min_servers),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs)
    }
}

/// Background refresh loop policy.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Time between scan passes.
    pub interval: Duration,
    /// Shorter sleep after a pass-level error.
    pub recovery_delay: Duration,
    /// Simultaneous item refreshes per pass.
    pub max_concurrent: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            recovery_delay: Duration::from_secs(60),
            max_concurrent: 1,
        }
    }
}

impl ScannerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: Duration::from_secs(env_u64(
                "PLAYLINK_SCAN_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )),
            recovery_delay: Duration::from_secs(env_u64(
                "PLAYLINK_SCAN_RECOVERY_SECS",
                defaults.recovery_delay.as_secs(),
            )),
            max_concurrent: env_usize("PLAYLINK_SCAN_CONCURRENCY", defaults.max_concurrent),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default,
    }
}
