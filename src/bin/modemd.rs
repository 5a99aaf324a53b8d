// ABOUTME: modemd entry point: loads the config, claims the ModemManager bus name and attaches devices
// ABOUTME: Runs until interrupted, then closes every device

use anyhow::Context;
use modemd::config::{BusKind, CONFIG_ENV, Config, config_path};
use modemd::dbus::{SERVICE_NAME, serve_manager};
use modemd::manager::Manager;
use modemd::plugin::Registry;
use std::sync::Arc;
use tracing::{info, warn};
use zbus::connection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path(std::env::args().nth(1), std::env::var(CONFIG_ENV).ok());
    let config = Config::load(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.daemon.log_level)),
        )
        .init();

    info!(config = %path.display(), "starting modemd");

    let builder = match config.daemon.bus {
        BusKind::System => connection::Builder::system()?,
        BusKind::Session => connection::Builder::session()?,
    };
    let conn = builder
        .name(SERVICE_NAME)?
        .build()
        .await
        .context("failed to connect to the message bus")?;

    let manager = Arc::new(Manager::new(
        Registry::builtin(),
        config.daemon.poll_intervals(),
    ));
    let events = serve_manager(&conn, manager.clone()).await?;

    for device in &config.devices {
        match manager.device_added(device).await {
            Ok((path, _)) => info!(udi = device.udi.as_str(), path, "device ready"),
            Err(e) => warn!(udi = device.udi.as_str(), error = %e, "could not attach device"),
        }
    }

    info!(bus = ?config.daemon.bus, "modemd running");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    manager.close_all().await;
    events.abort();
    Ok(())
}
