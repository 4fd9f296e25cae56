use std::time::Duration;

/// Alert API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Redis connection string. When unset the in-memory backends are used.
    pub redis_url: Option<String>,
    /// Key of the geo set holding device locations.
    pub geo_key: String,
    /// How long a dedup claim blocks re-broadcast of the same alert.
    pub dedup_ttl: Duration,
    /// Upper bound on a single alert submission, claim through dispatch.
    pub submission_timeout: Duration,
    /// Sessions that send nothing for this long are closed and their location dropped.
    pub idle_timeout: Duration,
    /// Per-session outbound buffer; deliveries beyond it are dropped.
    pub session_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4010,
            redis_url: None,
            geo_key: "device_locations".to_string(),
            dedup_ttl: Duration::from_secs(300),
            submission_timeout: Duration::from_millis(5000),
            idle_timeout: Duration::from_secs(120),
            session_buffer: 256,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            geo_key: std::env::var("GEO_KEY")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.geo_key),
            dedup_ttl: parsed_var("DEDUP_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.dedup_ttl),
            submission_timeout: parsed_var("SUBMISSION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.submission_timeout),
            idle_timeout: parsed_var("SESSION_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            session_buffer: parsed_var("SESSION_BUFFER")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.session_buffer),
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
