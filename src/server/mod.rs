//! WebSocket API server
//!
//! Wires the core services together and exposes them over axum:
//! - `/` and `/ws` upgrade to the JSON WebSocket API
//! - `/health` reports liveness as JSON

pub mod dispatcher;
pub mod messages;
pub mod ws;

use axum::routing::get;
use axum::Router;
use chrono::Utc;
use megg_communication::{
    CalibrationRouter, CommandExecutor, DeviceLink, PortOpener, ProtocolEngine,
};
use megg_core::{
    Broadcaster, Component, ComponentRegistry, ComponentsReport, EventBridge, EventSink,
    ServerInfo, ServerStatus, SystemStatus, Welcome, WorkProcess,
};
use megg_settings::Config;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use dispatcher::Dispatcher;

/// API flavour reported to clients
pub const API_TYPE: &str = "WebSocket API";

/// Greeting sent to every new client
pub const WELCOME_MESSAGE: &str = "Connected to MEGG IoT Backend API";

/// Shared state behind every connection
#[derive(Clone)]
pub struct AppState {
    broadcaster: Arc<Broadcaster>,
    events: EventSink,
    components: ComponentRegistry,
    process: WorkProcess,
    engine: Arc<ProtocolEngine>,
    calibration: CalibrationRouter,
    configurations: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    config: Arc<Config>,
}

impl AppState {
    /// Build every service from the configuration
    ///
    /// Must be called from within a tokio runtime; the returned bridge
    /// drains events into the broadcaster until shut down.
    pub fn build(config: Config, opener: Arc<dyn PortOpener>) -> (Self, EventBridge) {
        let broadcaster = Arc::new(Broadcaster::new());
        let (events, bridge) = EventBridge::spawn(broadcaster.clone());
        let components = ComponentRegistry::new();

        let process = WorkProcess::new(config.process.clone(), components.clone(), events.clone());
        let link = DeviceLink::new(config.serial.link.clone(), opener);
        let engine = Arc::new(ProtocolEngine::new(link, config.protocol, events.clone()));
        let calibration = CalibrationRouter::new(
            engine.clone() as Arc<dyn CommandExecutor>,
            components.clone(),
            config.calibration.policy(),
        );

        let state = Self {
            broadcaster,
            events,
            components,
            process,
            engine,
            calibration,
            configurations: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        };
        (state, bridge)
    }

    /// Observer registry
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Queue feeding the broadcaster
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Component calibration table
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Work-process state machine
    pub fn process(&self) -> &WorkProcess {
        &self.process
    }

    /// Protocol engine owning the device link
    pub fn engine(&self) -> &Arc<ProtocolEngine> {
        &self.engine
    }

    /// Calibration router
    pub fn calibration(&self) -> &CalibrationRouter {
        &self.calibration
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store a client configuration in memory
    pub fn store_configuration(&self, account_id: String, configuration: serde_json::Value) {
        self.configurations.write().insert(account_id, configuration);
    }

    /// Configuration stored for an account
    pub fn configuration(&self, account_id: &str) -> Option<serde_json::Value> {
        self.configurations.read().get(account_id).cloned()
    }

    /// Welcome payload for a new client
    pub fn welcome(&self) -> Welcome {
        let capabilities = BTreeMap::from([
            (
                "calibration".to_string(),
                "Hardware component calibration".to_string(),
            ),
            (
                "work_process".to_string(),
                "Egg processing workflow simulation".to_string(),
            ),
            (
                "real_time_updates".to_string(),
                "Live progress and status updates".to_string(),
            ),
        ]);
        Welcome {
            message: WELCOME_MESSAGE.to_string(),
            server_info: ServerInfo {
                version: crate::VERSION.to_string(),
                api_type: API_TYPE.to_string(),
                components: supported_components(),
            },
            capabilities,
            timestamp: Utc::now(),
        }
    }

    /// Full system status
    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            arduino: self.engine.status(),
            server: ServerStatus {
                connected_clients: self.broadcaster.observer_count(),
                running: true,
                api_type: API_TYPE.to_string(),
                version: crate::VERSION.to_string(),
            },
            components: ComponentsReport {
                supported: supported_components(),
                status: self.components.readiness(),
                calibration: self.components.snapshot(),
            },
            work_process: self.process.snapshot(),
            timestamp: Utc::now(),
        }
    }
}

fn supported_components() -> Vec<String> {
    Component::supported()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// HTTP routes of the API
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(ws::health_handler))
        .with_state(state)
}
