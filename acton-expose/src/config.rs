//! Layered service configuration
//!
//! Sources, highest precedence first:
//! 1. Environment variables (prefix: ACTON_, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/acton-expose/{service_name}/config.toml
//! 4. System directory: /etc/acton-expose/{service_name}/config.toml
//! 5. Default values
//!
//! The loaded [`Config`] is built once at startup and handed to the exposure
//! and dispatch machinery by reference.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Process-wide settings shared by every handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity and logging of the running service
    pub service: ServiceConfig,

    /// Error dispatch policy
    #[serde(default)]
    pub errors: ErrorsConfig,

    /// Envelope and header behaviour
    #[serde(default)]
    pub exposure: ExposureConfig,

    /// ETag / max-age caching
    #[serde(default)]
    pub caching: CachingConfig,

    /// Redis cache store; ETags stay in memory without it
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Service identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name reported in logs
    pub name: String,

    /// `EnvFilter` directive, e.g. `info` or `acton_expose=debug`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (development, test, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Error dispatch configuration
///
/// `pass_through` and `show_exception_message` are left unset by default and
/// resolved against the environment by [`Config::error_policy`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorsConfig {
    /// Let unhandled exceptions propagate to the host instead of rendering an envelope
    #[serde(default)]
    pub pass_through: Option<bool>,

    /// Expose the message of unmapped exceptions in `error_description`
    #[serde(default)]
    pub show_exception_message: Option<bool>,

    /// HTTP status used by the built-in `throttled` kind
    #[serde(default)]
    pub throttled_status: Option<u16>,
}

/// Envelope configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureConfig {
    /// Mirror count and pagination metadata into `X-Api-*` headers
    #[serde(default = "default_false")]
    pub header_metadata: bool,

    /// Allow per-value and per-call serializers
    #[serde(default = "default_true")]
    pub serializers_enabled: bool,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            header_metadata: false,
            serializers_enabled: true,
        }
    }
}

/// Response caching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachingConfig {
    /// Master switch for ETag and max-age headers
    #[serde(default = "default_false")]
    pub enabled: bool,

    /// Default max-age for cached collection responses, in seconds
    #[serde(default = "default_caching_timeout")]
    pub timeout_secs: u64,

    /// Prefix applied to every key written to the cache store
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_caching_timeout(),
            key_prefix: String::new(),
        }
    }
}

impl CachingConfig {
    /// Get the default caching timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Connection settings for the Redis cache store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, `redis://host:port`
    pub url: String,

    /// Pool size
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,

    /// Connection attempts before giving up at startup
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between attempts, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

/// Resolved error dispatch flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    /// Exceptions propagate to the host unhandled
    pub pass_through_errors: bool,
    /// Unmapped exceptions keep their own message
    pub show_exception_message: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_caching_timeout() -> u64 {
    3600
}

fn default_redis_max_connections() -> usize {
    20
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

const APP_DIR: &str = "acton-expose";
const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "ACTON_";

/// Candidate config files, highest priority first
fn config_search_path(service_name: &str) -> Vec<PathBuf> {
    let relative = Path::new(service_name).join(CONFIG_FILE);
    let user = xdg::BaseDirectories::with_prefix(APP_DIR).find_config_file(&relative);
    let system = Path::new("/etc").join(APP_DIR).join(&relative);

    std::iter::once(PathBuf::from(CONFIG_FILE))
        .chain(user)
        .chain(std::iter::once(system))
        .collect()
}

/// Environments where errors surface locally instead of being enveloped
fn is_local_environment(environment: &str) -> bool {
    matches!(
        environment.to_ascii_lowercase().as_str(),
        "development" | "dev" | "test"
    )
}

impl Config {
    /// Load configuration for the running executable
    ///
    /// The service name is the executable's file stem, so a binary called
    /// `orders` reads `~/.config/acton-expose/orders/config.toml`.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| APP_DIR.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a named service
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let files: Vec<PathBuf> = config_search_path(service_name)
            .into_iter()
            .filter(|path| path.is_file())
            .collect();

        tracing::debug!(service = service_name, files = ?files, "Resolved configuration files");

        // Search order is highest priority first; merge lowest first
        Self::extract(files.iter().rev().map(PathBuf::as_path))
    }

    /// Load configuration from one file
    ///
    /// Bypasses the XDG and system directories. Environment variables still
    /// take precedence over the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::extract(std::iter::once(path.as_ref()))
    }

    fn extract<'p>(files: impl Iterator<Item = &'p Path>) -> Result<Self> {
        let figment = files.fold(
            Figment::from(Serialized::defaults(Config::default())),
            |figment, file| figment.merge(Toml::file(file)),
        );

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()?)
    }

    /// Resolve the error dispatch flags
    ///
    /// Explicit values win. Unset flags default to `true` in development and
    /// test environments and `false` everywhere else.
    pub fn error_policy(&self) -> ErrorPolicy {
        let local = is_local_environment(&self.service.environment);
        ErrorPolicy {
            pass_through_errors: self.errors.pass_through.unwrap_or(local),
            show_exception_message: self.errors.show_exception_message.unwrap_or(local),
        }
    }

    /// Whether the service runs in a development-like environment
    pub fn is_development(&self) -> bool {
        is_local_environment(&self.service.environment)
    }

    /// Redis connection URL, when a store is configured
    pub fn redis_url(&self) -> Option<&str> {
        self.redis.as_ref().map(|r| r.url.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: APP_DIR.to_string(),
                log_level: default_log_level(),
                environment: default_environment(),
            },
            errors: ErrorsConfig::default(),
            exposure: ExposureConfig::default(),
            caching: CachingConfig::default(),
            redis: None,
        }
    }
}
