//! relay client entry point
//!
//! Run with:
//! ```bash
//! RELAY_TOKEN=... cargo run -p relay-client --bin relay
//! ```
//!
//! Configuration is loaded from environment variables.

use anyhow::Context as _;
use relay_client::Client;
use relay_common::{try_init_tracing, ClientConfig};
use relay_gateway::{Handler, WILDCARD};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %format!("{e:#}"), "Client failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting relay client...");

    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    info!(
        env = ?config.app.env,
        intents = config.gateway.intents,
        cache_mode = ?config.cache.mode,
        "Configuration loaded"
    );

    let client = Client::new(config)?;

    client.on(
        WILDCARD,
        Handler::event(|ctx, event| {
            info!(shard_id = ctx.shard_id(), event = %event.name, seq = ?event.sequence, "Event");
        }),
    );
    client.on(
        "READY",
        Handler::context(|ctx| {
            if let Some(cache) = ctx.cache() {
                let stats = cache.stats();
                info!(shard_id = ctx.shard_id(), guilds = stats.guilds, "Shard ready");
            }
        }),
    );

    client.connect().await?;

    tokio::select! {
        ready = client.wait_ready() => {
            ready.context("Shards failed to become ready")?;
            info!(shards = client.shard_info().await.len(), "All shards ready");
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!("Shutdown signal received");
    client.shutdown().await;
    Ok(())
}
