//! Packet Player
//!
//! Receives Opus packets from a relay and plays them on the default output.
//!
//! Usage: `player [config.toml]`

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ws_audio_api::{
    audio::{list_devices, CpalHost},
    network::{Channel, WsChannel},
    AudioConfig, Player,
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

    tracing::info!("Starting WS Audio Player");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AudioConfig::load_or_default(config_path.as_deref())?;

    println!("\n=== Output Devices ===");
    for device in list_devices().iter().filter(|d| d.is_output) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
    }
    println!();

    let host = Arc::new(CpalHost::new()?);
    let channel = Arc::new(WsChannel::connect(&config.server.url()).await?);

    let mut player = Player::new(config, host, channel.clone())?;
    player.start()?;

    println!("Playing from {}. Press Ctrl+C to stop.", channel.url());

    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = stats_interval.tick() => {
                if let Some(stats) = player.stats() {
                    tracing::info!(
                        "Decoded: {}, rejected: {}, queued: {} ({:.0}%), underruns: {}, dropped samples: {}",
                        stats.packets_decoded,
                        stats.packets_rejected,
                        stats.queue.queued,
                        stats.queue.fill_level() * 100.0,
                        stats.queue.underruns,
                        stats.queue.dropped_samples
                    );
                }
                if !channel.is_connected() {
                    tracing::warn!("Relay connection lost");
                    break;
                }
            }
        }
    }

    tracing::info!("Shutting down...");
    player.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;
    channel.close();

    Ok(())
}
