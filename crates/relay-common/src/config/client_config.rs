//! Client configuration structs
//!
//! Loads configuration from environment variables (with `.env` support).
//! Every setting except the bot token has a default.

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub app: AppSettings,
    /// Bot token sent in Identify and the Authorization header
    pub token: String,
    pub gateway: GatewayConfig,
    pub rest: RestConfig,
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Gateway (shard) settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway URL; fetched from `GET /gateway/bot` when unset
    pub url: Option<String>,
    /// Total shard count; the recommended count is used when unset
    pub shard_count: Option<u32>,
    /// Raw intents bitfield sent in Identify
    #[serde(default = "default_intents")]
    pub intents: u64,
    /// Member count above which a guild is sent without offline members
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u8,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// First reconnect delay; doubled on every consecutive failure
    #[serde(default = "default_backoff_base")]
    pub backoff_base: Duration,
    #[serde(default = "default_backoff_max")]
    pub backoff_max: Duration,
    /// Outbound commands allowed per minute per shard
    #[serde(default = "default_commands_per_minute")]
    pub commands_per_minute: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            shard_count: None,
            intents: default_intents(),
            large_threshold: default_large_threshold(),
            connect_timeout: default_connect_timeout(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            commands_per_minute: default_commands_per_minute(),
        }
    }
}

/// REST dispatcher settings
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// 429 retries before giving up with a rate-limit error
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fail instead of waiting when a bucket is exhausted
    #[serde(default)]
    pub cancel_on_rate_limit: bool,
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// Buckets unused for this long are dropped
    #[serde(default = "default_bucket_idle_ttl")]
    pub bucket_idle_ttl: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            max_retries: default_max_retries(),
            cancel_on_rate_limit: false,
            global_requests_per_second: default_global_requests_per_second(),
            request_timeout: default_request_timeout(),
            bucket_idle_ttl: default_bucket_idle_ttl(),
            user_agent: default_user_agent(),
        }
    }
}

/// How the cache hands out entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Callers share the stored instance and observe later updates
    Mutable,
    /// Callers receive deep copies that never change
    #[default]
    Immutable,
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mutable" => Ok(Self::Mutable),
            "immutable" => Ok(Self::Immutable),
            other => Err(format!("unknown cache mode '{other}'")),
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub mode: CacheMode,
}

// Default value functions
fn default_app_name() -> String {
    "relay".to_string()
}

fn default_intents() -> u64 {
    // GUILDS | GUILD_VOICE_STATES | GUILD_MESSAGES
    (1 << 0) | (1 << 7) | (1 << 9)
}

fn default_large_threshold() -> u8 {
    50
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(60)
}

fn default_commands_per_minute() -> u32 {
    120
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_global_requests_per_second() -> u32 {
    50
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_bucket_idle_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    format!("DiscordBot (relay, {})", env!("CARGO_PKG_VERSION"))
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: Environment::default(),
            },
            token: token.into(),
            gateway: GatewayConfig::default(),
            rest: RestConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `RELAY_TOKEN` is missing or a variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        Ok(Self {
            app: AppSettings {
                name: vars.get("RELAY_APP_NAME").unwrap_or_else(default_app_name),
                env: vars.parse("RELAY_ENV")?.unwrap_or_default(),
            },
            token: vars
                .get("RELAY_TOKEN")
                .filter(|t| !t.is_empty())
                .ok_or(ConfigError::MissingVar("RELAY_TOKEN"))?,
            gateway: GatewayConfig {
                url: vars.get("RELAY_GATEWAY_URL"),
                shard_count: vars.parse("RELAY_SHARD_COUNT")?,
                intents: vars.parse("RELAY_INTENTS")?.unwrap_or_else(default_intents),
                large_threshold: vars
                    .parse("RELAY_LARGE_THRESHOLD")?
                    .unwrap_or_else(default_large_threshold),
                connect_timeout: vars
                    .millis("RELAY_CONNECT_TIMEOUT_MS")?
                    .unwrap_or_else(default_connect_timeout),
                backoff_base: vars
                    .millis("RELAY_BACKOFF_BASE_MS")?
                    .unwrap_or_else(default_backoff_base),
                backoff_max: vars
                    .millis("RELAY_BACKOFF_MAX_MS")?
                    .unwrap_or_else(default_backoff_max),
                commands_per_minute: vars
                    .parse("RELAY_COMMANDS_PER_MINUTE")?
                    .unwrap_or_else(default_commands_per_minute),
            },
            rest: RestConfig {
                api_base: vars.get("RELAY_API_BASE").unwrap_or_else(default_api_base),
                max_retries: vars
                    .parse("RELAY_MAX_RETRIES")?
                    .unwrap_or_else(default_max_retries),
                cancel_on_rate_limit: vars
                    .parse("RELAY_CANCEL_ON_RATE_LIMIT")?
                    .unwrap_or(false),
                global_requests_per_second: vars
                    .parse("RELAY_GLOBAL_REQUESTS_PER_SECOND")?
                    .unwrap_or_else(default_global_requests_per_second),
                request_timeout: vars
                    .millis("RELAY_REQUEST_TIMEOUT_MS")?
                    .unwrap_or_else(default_request_timeout),
                bucket_idle_ttl: vars
                    .millis("RELAY_BUCKET_IDLE_TTL_MS")?
                    .unwrap_or_else(default_bucket_idle_ttl),
                user_agent: vars.get("RELAY_USER_AGENT").unwrap_or_else(default_user_agent),
            },
            cache: CacheConfig {
                mode: vars.parse("RELAY_CACHE_MODE")?.unwrap_or_default(),
            },
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue(key, raw)),
        }
    }

    fn millis(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
