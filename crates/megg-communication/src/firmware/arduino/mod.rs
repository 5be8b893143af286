//! Rig controller firmware support
//!
//! The controller is an Arduino sketch speaking newline-terminated ASCII.
//! This module provides:
//! - Command construction with per-class read budgets
//! - Line classification into errors, lifecycle markers and chatter
//! - The protocol engine that serializes exchanges over the device link
//! - The calibration router built on top of it

pub mod calibration;
pub mod command_creator;
pub mod engine;
pub mod response_parser;

pub use calibration::{CalibrationRouter, ConfirmationPolicy};
pub use command_creator::{Budget, Budgets, Command, CommandClass};
pub use engine::{CommandExecutor, CommandOutcome, Completion, ProtocolEngine};
pub use response_parser::{classify, classify_for, LineClass, LineKind, Marker};
