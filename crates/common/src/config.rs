//! Application configuration.

use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Default `User-Agent` for outgoing requests.
pub const DEFAULT_USER_AGENT: &str = concat!("apclient/", env!("CARGO_PKG_VERSION"));

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP client configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// HTTP Signature configuration.
    #[serde(default)]
    pub signing: SigningConfig,
    /// C2S OAuth2 client configuration.
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// Response cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Request dump configuration.
    #[serde(default)]
    pub debug: DebugConfig,
}

/// HTTP client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// `User-Agent` sent when a request carries none.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Overall request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Accept invalid TLS certificates. Development only.
    #[serde(default)]
    pub skip_tls_verify: bool,
}

/// HTTP Signature configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SigningConfig {
    /// IRI of the actor requests are signed as.
    #[serde(default)]
    pub actor: Option<String>,
    /// Path to the actor's private key (PEM).
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}

/// C2S OAuth2 client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// OAuth2 client id.
    #[serde(default)]
    pub client_id: String,
    /// OAuth2 client secret. Enables the client-credentials grant for
    /// application actors.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Loopback redirect URL registered with the authorization server.
    #[serde(default)]
    pub redirect_url: Option<String>,
    /// Whether the browser-based authorization code flow may be used.
    #[serde(default = "default_true")]
    pub interactive: bool,
    /// How long to wait for the browser callback, in seconds.
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    /// Print a waiting indicator while the callback is pending.
    #[serde(default)]
    pub show_progress: bool,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Whether GET responses are cached.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Total body bytes kept in the cache.
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: usize,
    /// Lifetime of a cached response in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

/// Request dump configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugConfig {
    /// Existing directory that receives one file per exchange.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_connect_timeout_ms() -> u64 {
    2500
}

const fn default_wait_secs() -> u64 {
    90
}

const fn default_cache_max_bytes() -> usize {
    1024 * 1024
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_true() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            skip_tls_verify: false,
        }
    }
}

impl HttpConfig {
    /// Overall request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_url: None,
            interactive: true,
            wait_secs: default_wait_secs(),
            show_progress: false,
        }
    }
}

impl OAuthConfig {
    /// How long to wait for the browser callback.
    #[must_use]
    pub const fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: default_cache_max_bytes(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Lifetime of a cached response.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `APCLIENT_ENV`)
    /// 3. Environment variables with `APCLIENT__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("APCLIENT_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("APCLIENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("APCLIENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
