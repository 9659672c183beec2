//! Relay Server
//!
//! Forwards every `speak` from one peer to all others as `getSpeak`.
//!
//! Usage: `relay [config.toml]`

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ws_audio_api::{network::relay, AudioConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WS Audio Relay");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AudioConfig::load_or_default(config_path.as_deref())?;

    tokio::select! {
        result = relay::run(&config.server) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down..."),
    }

    Ok(())
}
