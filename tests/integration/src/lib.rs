//! Integration test utilities for the relay client runtime
//!
//! Scripted gateway and HTTP transports stand in for the platform, so the
//! full client (shards, cache, dispatcher, REST) runs end to end in-process.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
