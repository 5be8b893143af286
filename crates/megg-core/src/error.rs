//! Error handling for MEGG
//!
//! Provides error types for every layer of the backend:
//! - Connection errors (serial link not open, read/write failure)
//! - Protocol errors (device reported an error, unexpected response)
//! - Validation errors (rejected before any device I/O)
//! - Process errors (work-process state machine faults)
//!
//! A command that runs out of budget keeps whatever lines arrived; the
//! protocol engine reports it as a completion kind and converts it into a
//! [`ProtocolError`] only when a verdict is needed.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Represents failures of the single serial link to the rig controller.
/// These are never retried automatically and always leave the link closed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// No link is open
    #[error("Arduino not connected")]
    NotConnected,

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// The port opened but the device did not answer the status probe
    #[error("No response from device on {port}")]
    ProbeFailed {
        /// The port that was probed.
        port: String,
    },

    /// Every candidate port was tried and none answered
    #[error("No device found on {tried} candidate port(s)")]
    NoDeviceFound {
        /// Number of candidates attempted.
        tried: usize,
    },

    /// Writing to the link failed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The underlying I/O failure.
        reason: String,
    },

    /// Connection lost while reading
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Port enumeration failed
    #[error("Failed to enumerate ports: {reason}")]
    Enumeration {
        /// The reason enumeration failed.
        reason: String,
    },
}

/// Protocol error type
///
/// Raised when an exchange ran but did not end in a completion marker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The device sent an error marker line
    #[error("Device error: {line}")]
    DeviceError {
        /// The offending line, verbatim.
        line: String,
    },

    /// The budget ran out before a completion marker arrived
    #[error("{command} not confirmed by device ({lines} line(s) received)")]
    NotConfirmed {
        /// The command that was issued.
        command: String,
        /// Number of lines received before giving up.
        lines: usize,
    },
}

/// Validation error type
///
/// Requests rejected synchronously, before any device I/O.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required field is absent
    #[error("{field} not specified")]
    MissingField {
        /// Human-facing name of the missing field.
        field: String,
    },

    /// The component identifier is not usable as a device verb
    #[error("Invalid component identifier: {component}")]
    InvalidComponent {
        /// The identifier as received.
        component: String,
    },

    /// Calibration is already running for this component
    #[error("{component} is already calibrating")]
    AlreadyCalibrating {
        /// The component that is busy.
        component: String,
    },

    /// A numeric field is out of range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Work-process error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    /// A start was requested while the machine cannot start
    #[error("Cannot start processing. Check component readiness or current status.")]
    CannotStart,

    /// Nothing to stop
    #[error("No active processing to stop")]
    NotProcessing,

    /// Reset while a run is still active
    #[error("Cannot reset while {state} is in progress")]
    ResetWhileRunning {
        /// The state the machine was in.
        state: String,
    },

    /// Fault raised inside the phase sequence
    #[error("Processing error: {reason}")]
    Fault {
        /// Description of the fault.
        reason: String,
    },
}

/// Main error type for MEGG
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Validation error
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Work-process error
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl Error {
    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if this is a work-process error
    pub fn is_process_error(&self) -> bool {
        matches!(self, Error::Process(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
