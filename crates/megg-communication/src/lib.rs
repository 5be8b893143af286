//! # MEGG Communication
//!
//! Serial link and controller protocol for the MEGG egg-sorting rig.
//! Covers port discovery and probing, the line-oriented command protocol,
//! and calibration requests. A virtual device stands in for the hardware
//! in simulation mode and in tests.

pub mod communication;
pub mod firmware;

pub use communication::{
    device_link::DeviceLink,
    serial::{list_ports, PortOpener, SerialPort, SerialPortInfo, SystemPortOpener},
    virtual_port::{VirtualBehavior, VirtualDevice, VirtualPortOpener},
    ConnectionParams,
};

pub use firmware::{
    Budget, Budgets, CalibrationRouter, Command, CommandClass, CommandExecutor, CommandOutcome,
    Completion, ConfirmationPolicy, LineClass, LineKind, Marker, ProtocolEngine,
};
