// src/main.rs
//! GPS Proxy - republishes NMEA streams from GPS clients over MQTT

use anyhow::Context;
use clap::Parser;
use gps_proxy::{LogPublisher, MqttPublisher, ProxyConfig, ProxyServer, Publisher};
use std::{path::PathBuf, sync::Arc};

#[derive(Debug, Parser)]
#[command(name = "gps-proxy", version, about)]
struct Args {
    /// Configuration file (default: ~/.config/gps-proxy.yml, then /etc/gps-proxy.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log measurements instead of publishing them to the broker
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let (config, path) = ProxyConfig::load(args.config.as_deref())?;
    log::info!("Using config: {}", path.display());

    let settings = config
        .resolve()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    log::info!("{} client(s) configured", settings.registry.len());

    let listener = ProxyServer::bind(&settings.listen_addr).await?;

    let mut mqtt = None;
    let publisher: Arc<dyn Publisher> = if args.dry_run {
        log::info!("Dry run, measurements are only logged");
        Arc::new(LogPublisher)
    } else {
        let (client, _driver) = MqttPublisher::connect(&settings.mqtt).await?;
        mqtt = Some(client.clone());
        Arc::new(client)
    };

    let server = ProxyServer::new(settings.registry, publisher);

    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Received shutdown signal"),
    }

    if let Some(client) = mqtt {
        if let Err(e) = client.disconnect().await {
            log::warn!("Failed to disconnect from MQTT broker: {}", e);
        }
    }

    println!("\nShutting down...");
    Ok(())
}
