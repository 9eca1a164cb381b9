//! # relay-common
//!
//! Shared utilities: client configuration loaded from the environment and
//! tracing subscriber setup.

pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppSettings, CacheConfig, CacheMode, ClientConfig, ConfigError, Environment, GatewayConfig,
    RestConfig,
};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
