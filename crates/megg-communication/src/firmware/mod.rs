//! Firmware support for the rig controller
//!
//! Only one controller family exists today, the Arduino sketch driving the
//! load cell, the conveyor stepper and the sorting servos.

pub mod arduino;

pub use arduino::{
    Budget, Budgets, CalibrationRouter, Command, CommandClass, CommandExecutor, CommandOutcome,
    Completion, ConfirmationPolicy, LineClass, LineKind, Marker, ProtocolEngine,
};
