use anyhow::Context;
use clap::Parser;
use megg::server::{self, AppState};
use megg::{init_logging, Config, SystemPortOpener, VirtualDevice, VirtualPortOpener};
use megg_communication::PortOpener;
use std::path::PathBuf;
use std::sync::Arc;

/// Port name of the in-process virtual controller
const VIRTUAL_PORT: &str = "VIRTUAL0";

/// MEGG rig backend: serial controller link plus JSON WebSocket API
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration and HOST
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides the configuration and PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Serial port of the rig controller, overrides ARDUINO_PORT
    #[arg(long)]
    serial_port: Option<String>,

    /// Use the virtual rig controller instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Log one JSON object per line
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json)?;

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(port) = args.serial_port {
        config.serial.link.port = Some(port);
    }
    if args.simulate {
        config.serial.simulate = true;
    }

    let opener: Arc<dyn PortOpener> = if config.serial.simulate {
        tracing::info!("Simulation mode: using the virtual rig controller");
        config.serial.link.port = Some(VIRTUAL_PORT.to_string());
        config.serial.link.fallback_ports.clear();
        Arc::new(VirtualPortOpener::new(VirtualDevice::new(), VIRTUAL_PORT))
    } else {
        Arc::new(SystemPortOpener)
    };
    config.validate()?;

    tracing::info!(
        "Starting MEGG backend v{} (built {})",
        megg::VERSION,
        megg::BUILD_DATE
    );
    let address = config.server.bind_address();
    let (state, bridge) = AppState::build(config, opener);

    // The server comes up even when no controller answers.
    let engine = state.engine().clone();
    tokio::spawn(async move {
        match engine.connect().await {
            Ok(port) => tracing::info!("Rig controller ready on {}", port),
            Err(e) => tracing::warn!("Running without rig controller: {}", e),
        }
    });

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("WebSocket API listening on ws://{}/ws", address);

    axum::serve(listener, server::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down");
    if state.process().is_processing() {
        let _ = state.process().stop();
    }
    state.engine().disconnect().await;
    bridge.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
