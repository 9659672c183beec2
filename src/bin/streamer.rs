//! Microphone Streamer
//!
//! Captures the default input device and sends Opus packets to a relay.
//!
//! Usage: `streamer [config.toml]`

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ws_audio_api::{
    audio::{list_devices, CpalHost},
    network::WsChannel,
    AudioConfig, Streamer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WS Audio Streamer");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AudioConfig::load_or_default(config_path.as_deref())?;

    println!("\n=== Input Devices ===");
    for device in list_devices().iter().filter(|d| d.is_input) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    let host = Arc::new(CpalHost::new()?);
    let channel = Arc::new(WsChannel::connect(&config.server.url()).await?);

    let mut streamer = Streamer::new(config, host, channel.clone())?;
    streamer.start()?;

    println!("Streaming to {}. Press Ctrl+C to stop.", channel.url());

    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats_interval.tick() => {
                let stats = streamer.stats();
                tracing::info!(
                    "Blocks: {}, sent: {}, dropped: {}",
                    stats.blocks_captured,
                    stats.packets_sent,
                    stats.packets_dropped
                );
            }
        }
    }

    tracing::info!("Shutting down...");
    streamer.stop();
    // Let the writer flush the disconnect frame
    tokio::time::sleep(Duration::from_millis(100)).await;
    channel.close();

    Ok(())
}
