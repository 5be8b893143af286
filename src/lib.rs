//! # MEGG
//!
//! Control backend for the MEGG egg-sorting rig with support for:
//! - Serial link discovery and probing of the Arduino rig controller
//! - Serialized command exchanges with per-command time budgets
//! - Component calibration with progress streaming
//! - A simulated batch work process with live statistics
//! - A JSON WebSocket API broadcasting every event to connected clients
//!
//! ## Architecture
//!
//! MEGG is organized as a workspace with multiple crates:
//!
//! 1. **megg-core** - Errors, data model, event broadcaster, work process
//! 2. **megg-communication** - Serial link, controller protocol, calibration
//! 3. **megg-settings** - Configuration files and environment overrides
//! 4. **megg** - WebSocket server and the main binary

pub mod server;

pub use megg_communication::{
    CalibrationRouter, Command, CommandExecutor, ConfirmationPolicy, ConnectionParams,
    DeviceLink, ProtocolEngine, SystemPortOpener, VirtualBehavior, VirtualDevice,
    VirtualPortOpener,
};
pub use megg_core::{
    Broadcaster, ComponentRegistry, Error, Event, EventBridge, EventSink, Result, WorkProcess,
};
pub use megg_settings::Config;
pub use server::{AppState, Dispatcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support, `info` by default
/// - Pretty console output, or one JSON object per line when `json` is set
/// - Thread ids and line numbers
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .json();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
