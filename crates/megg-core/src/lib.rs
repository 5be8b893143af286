//! # MEGG Core
//!
//! Core types and services shared by the MEGG backend crates.
//! Provides the error taxonomy, the rig data model, the event broadcaster
//! with its cross-thread bridge, and the work-process state machine.

pub mod data;
pub mod error;
pub mod event_bus;
pub mod process;

pub use data::{
    Batch, BatchStats, CalibrationState, Component, ComponentRegistry, ComponentStatus,
    DeviceStatus, EggQuality, EggResult, EggSize, ProcessState,
};

pub use error::{
    ConnectionError, Error, ProcessError, ProtocolError, Result, ValidationError,
};

pub use event_bus::{
    BroadcastError, Broadcaster, CalibrationOutcome, CalibrationStatus, CommandReport,
    ComponentsReport, Event, EventBridge, EventSink, ObserverId, ObserverReceiver, ServerInfo,
    ServerStatus, SystemStatus, Welcome, WorkProcessResponse,
};

pub use process::{
    DelayRange, EggInspector, ProcessConfig, ProcessSnapshot, RandomInspector, WorkProcess,
};
