pub mod channel;
pub mod config;
pub mod device;
pub mod engine;

use crate::channel::ChannelHandle;
use crate::config::PendantConfig;
use crate::device::DeviceHandle;
use crate::engine::PendantEngine;
use color_eyre::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = PendantConfig::load();
    info!(
        "Starting jogpad: device {}, channel {}",
        config.device_path, config.channel_addr
    );

    let (event_sender, event_receiver) = mpsc::channel(1000);
    let (ack_sender, ack_receiver) = mpsc::channel(100);

    let device_handle = DeviceHandle::spawn(
        PathBuf::from(&config.device_path),
        Duration::from_millis(config.reconnect_tick_ms),
        event_sender,
    );

    let channel_handle = ChannelHandle::spawn(
        config.channel_addr.clone(),
        config.port_id.clone(),
        ack_sender,
    );

    let engine = PendantEngine::new(&config, channel_handle.request_sender());
    engine.run(event_receiver, ack_receiver).await;

    device_handle.close();
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
