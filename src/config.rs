use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use sha2::{Sha256, Digest};

use crate::expiry::MAX_EXPIRY_DAYS;

/// default chunk size handed to clients (5 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// root data directory (holds shares/ and uploads/)
    pub data_dir: PathBuf,
    /// public api address
    pub public_host: String,
    /// public api port
    pub public_port: u16,
    /// admin api address
    pub admin_host: String,
    /// admin api port
    pub admin_port: u16,
    /// prefix for share links handed back to clients
    pub base_url: String,
    /// maximum upload size in bytes
    pub max_upload_size: usize,
    /// number of tokio worker threads
    pub worker_threads: usize,
    /// api key for admin authentication (hashed)
    pub api_key_hash: String,
    /// cors allowed origins (comma-separated)
    pub cors_origins: Vec<String>,
    /// rate limit: requests per minute
    pub rate_limit_per_minute: u64,
    /// size of each upload chunk in bytes
    pub chunk_size: u64,
    /// upload sessions idle longer than this are discarded
    pub upload_timeout: Duration,
    /// how often the sweeper runs
    pub sweep_interval: Duration,
    /// lifetime of shares created with the default policy (None = permanent)
    pub default_expiry: Option<chrono::Duration>,
    /// key used to sign share unlock cookies (None = random per process)
    pub cookie_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            public_host: "127.0.0.1".to_string(),
            public_port: 4848,
            admin_host: "127.0.0.1".to_string(),
            admin_port: 4849,
            base_url: "http://127.0.0.1:4848".to_string(),
            max_upload_size: 10 * 1024 * 1024 * 1024, // 10GB default
            worker_threads: 8,
            api_key_hash: Self::hash_api_key("changeme"),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            rate_limit_per_minute: 60,
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_timeout: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
            default_expiry: Some(chrono::Duration::days(30)),
            cookie_secret: None,
        }
    }
}

impl Config {
    /// load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // get api key from env and hash it
        let api_key = std::env::var("ADMIN_API_KEY")
            .unwrap_or_else(|_| {
                tracing::warn!("⚠️  No ADMIN_API_KEY set! Using default 'changeme' - CHANGE THIS IN PRODUCTION!");
                "changeme".to_string()
            });

        let api_key_hash = Self::hash_api_key(&api_key);

        // parse cors origins
        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        let public_host = std::env::var("PUBLIC_HOST").unwrap_or(defaults.public_host);
        let public_port = env_parse("PUBLIC_PORT").unwrap_or(defaults.public_port);

        let base_url = std::env::var("BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| format!("http://{}:{}", public_host, public_port))
            .trim_end_matches('/')
            .to_string();

        let default_expiry = match std::env::var("DEFAULT_EXPIRY") {
            Ok(value) => Self::parse_default_expiry(&value),
            Err(_) => defaults.default_expiry,
        };

        let cookie_secret = std::env::var("COOKIE_SECRET")
            .ok()
            .filter(|s| !s.is_empty());
        if cookie_secret.is_none() {
            tracing::warn!("No COOKIE_SECRET set, unlock cookies won't survive a restart");
        }

        Self {
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            public_host,
            public_port,
            admin_host: std::env::var("ADMIN_HOST").unwrap_or(defaults.admin_host),
            admin_port: env_parse("ADMIN_PORT").unwrap_or(defaults.admin_port),
            base_url,
            max_upload_size: env_parse("MAX_UPLOAD_SIZE").unwrap_or(defaults.max_upload_size),
            worker_threads: env_parse("WORKER_THREADS")
                .filter(|t| *t > 0)
                .unwrap_or(defaults.worker_threads),
            api_key_hash,
            cors_origins,
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE")
                .filter(|r| *r > 0)
                .unwrap_or(defaults.rate_limit_per_minute),
            chunk_size: env_parse("CHUNK_SIZE")
                .filter(|c| *c > 0)
                .unwrap_or(defaults.chunk_size),
            upload_timeout: env_parse::<u64>("UPLOAD_TIMEOUT_HOURS")
                .filter(|h| *h > 0)
                .and_then(|h| h.checked_mul(60 * 60))
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_timeout),
            sweep_interval: env_parse::<u64>("SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            default_expiry,
            cookie_secret,
        }
    }

    /// parse DEFAULT_EXPIRY: "never", or a number of days like "30" / "30d"
    pub fn parse_default_expiry(value: &str) -> Option<chrono::Duration> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("never") {
            return None;
        }
        // unparseable or out of range values fall back to 30 days
        let days = value
            .trim_end_matches('d')
            .parse::<i64>()
            .ok()
            .filter(|d| (1..=i64::from(MAX_EXPIRY_DAYS)).contains(d))
            .unwrap_or(30);
        chrono::Duration::try_days(days).or(chrono::Duration::try_days(30))
    }

    pub fn public_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.public_host.parse()?, self.public_port))
    }

    pub fn admin_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.admin_host.parse()?, self.admin_port))
    }

    // hash api key using sha256
    pub fn hash_api_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
