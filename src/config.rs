//! Runtime configuration.
//!
//! All options are CLI flags with environment-variable fallbacks, resolved
//! once at startup into an immutable [`AppConfig`]. Components receive the
//! config by value and never read the environment themselves.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "encore-server", about = "Music recommendation server")]
pub struct CliArgs {
    /// PostgreSQL connection string for the track and interaction store.
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Redis connection string for the recommendation cache.
    #[clap(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    pub redis_url: String,

    /// Address to bind the API server to.
    #[clap(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, env = "PORT", default_value_t = 3002)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, env = "METRICS_PORT", default_value_t = 9092)]
    pub metrics_port: u16,

    /// Allowed origin for the push channel; unset allows none.
    #[clap(long, env = "CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Size in seconds of the rolling window for skip-burst detection.
    #[clap(long, env = "SKIP_WINDOW_SECS", default_value_t = 60)]
    pub skip_window_secs: u64,

    /// Number of skips inside the window that triggers a refresh.
    #[clap(long, env = "SKIP_THRESHOLD", default_value_t = 2)]
    pub skip_threshold: u64,

    /// Recommendation cache expiry in seconds.
    #[clap(long, env = "CACHE_TTL_SECS", default_value_t = 300)]
    pub cache_ttl_secs: u64,

    /// Maximum run of consecutive tracks by the same artist.
    #[clap(long, env = "MAX_SAME_ARTIST", default_value_t = 3)]
    pub max_same_artist: usize,

    /// Default number of tracks returned when the request has no limit.
    #[clap(long, env = "DEFAULT_LIMIT", default_value_t = 20)]
    pub default_limit: usize,

    /// Toggle the interest-graph integration.
    #[clap(
        long,
        env = "INTEREST_GRAPH_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub interest_graph_enabled: bool,

    /// Interval in seconds between popularity-aggregate refreshes.
    #[clap(long, env = "POPULAR_REFRESH_INTERVAL_SECS", default_value_t = 21_600)]
    pub popular_refresh_interval_secs: u64,

    /// Per-request store budget in milliseconds.
    #[clap(long, env = "REQUEST_DEADLINE_MS", default_value_t = 1_000)]
    pub request_deadline_ms: u64,
}

/// Immutable configuration assembled at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    pub cors_origin: Option<String>,

    pub skip_window: Duration,
    pub skip_threshold: u64,
    pub cache_ttl: Duration,
    pub max_same_artist: usize,
    pub default_limit: usize,
    pub interest_graph_enabled: bool,
    pub popular_refresh_interval: Duration,

    /// Budget for the store calls of one request.
    pub request_deadline: Duration,
    /// Budget for the detached interest-graph refresh after an interaction.
    pub graph_refresh_deadline: Duration,
    /// Budget for a single push emit during fan-out.
    pub emit_deadline: Duration,

    /// Hard cap on the request limit parameter.
    pub max_limit: usize,
    /// Hours of skip history excluded from personalized candidates.
    pub skip_exclusion_hours: u32,
    /// Bound on the skip exclusion list.
    pub skip_exclusion_limit: usize,
    /// Interest-graph avoid score at or above which a candidate is dropped.
    pub avoid_threshold: f64,
    /// Candidate over-fetch factor for the popularity paths.
    pub coldstart_overfetch: usize,
    /// Candidate over-fetch factor for the ANN path.
    pub ann_overfetch: usize,
}

impl AppConfig {
    pub fn resolve(args: &CliArgs) -> Self {
        Self {
            database_url: args.database_url.clone(),
            redis_url: args.redis_url.clone(),
            host: args.host.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            cors_origin: args.cors_origin.clone(),
            skip_window: Duration::from_secs(args.skip_window_secs),
            skip_threshold: args.skip_threshold,
            cache_ttl: Duration::from_secs(args.cache_ttl_secs),
            max_same_artist: args.max_same_artist,
            default_limit: args.default_limit,
            interest_graph_enabled: args.interest_graph_enabled,
            popular_refresh_interval: Duration::from_secs(args.popular_refresh_interval_secs),
            request_deadline: Duration::from_millis(args.request_deadline_ms),
            ..Self::default()
        }
    }
}

impl Default for AppConfig {
    /// The documented defaults, with connection strings left empty.
    /// Production configs always come through [`AppConfig::resolve`];
    /// tests start from here.
    fn default() -> Self {
        Self {
            database_url: String::new(),
            redis_url: String::new(),
            host: "127.0.0.1".into(),
            port: 0,
            metrics_port: 0,
            cors_origin: None,
            skip_window: Duration::from_secs(60),
            skip_threshold: 2,
            cache_ttl: Duration::from_secs(300),
            max_same_artist: 3,
            default_limit: 20,
            interest_graph_enabled: true,
            popular_refresh_interval: Duration::from_secs(21_600),
            request_deadline: Duration::from_secs(1),
            graph_refresh_deadline: Duration::from_secs(2),
            emit_deadline: Duration::from_secs(1),
            max_limit: 50,
            skip_exclusion_hours: 24,
            skip_exclusion_limit: 20,
            avoid_threshold: 0.6,
            coldstart_overfetch: 2,
            ann_overfetch: 3,
        }
    }
}
