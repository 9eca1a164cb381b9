//! Configuration structs

mod client_config;

pub use client_config::{
    AppSettings, CacheConfig, CacheMode, ClientConfig, ConfigError, Environment, GatewayConfig,
    RestConfig,
};
