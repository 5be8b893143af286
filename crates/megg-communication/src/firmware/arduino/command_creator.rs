//! Rig Controller Command Creator
//!
//! Builds the newline-terminated ASCII verbs understood by the controller
//! firmware and assigns each one a command class with its read budget.

use megg_core::{Component, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::response_parser::Marker;

/// Budget class of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Short status query
    Query,
    /// Component calibration
    Calibration,
    /// Full sorting cycle, stop and homing
    Cycle,
    /// Operator pass-through line
    Raw,
}

/// A command for the rig controller
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `STATUS`
    Status,
    /// `START[ ranges...]`
    Start {
        /// Weight ranges forwarded verbatim, one token each
        ranges: Vec<String>,
    },
    /// `STOP`
    Stop,
    /// `CALIBRATE_<COMPONENT>[ weight]`
    Calibrate {
        /// Component to calibrate
        component: Component,
        /// Optional reference weight in grams
        weight: Option<f64>,
    },
    /// `HOME`
    Home,
    /// Any other single line
    Raw(String),
}

impl Command {
    /// Calibration command for a component
    pub fn calibrate(component: Component, weight: Option<f64>) -> Self {
        Self::Calibrate { component, weight }
    }

    /// Sorting cycle with weight ranges
    ///
    /// Each range must be a single non-empty token.
    pub fn start<I, S>(ranges: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens = Vec::new();
        for range in ranges {
            let range: String = range.into();
            let range = range.trim().to_string();
            if range.is_empty() || range.contains(char::is_whitespace) {
                return Err(ValidationError::InvalidValue {
                    field: "ranges".to_string(),
                    reason: format!("'{}' is not a single token", range),
                });
            }
            tokens.push(range);
        }
        Ok(Self::Start { ranges: tokens })
    }

    /// Pass-through line
    ///
    /// Rejects empty input and embedded line breaks, which would smuggle a
    /// second command onto the wire.
    pub fn raw(line: &str) -> Result<Self, ValidationError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ValidationError::MissingField {
                field: "Command".to_string(),
            });
        }
        if line.contains(['\n', '\r']) {
            return Err(ValidationError::InvalidValue {
                field: "command".to_string(),
                reason: "must be a single line".to_string(),
            });
        }
        Ok(Self::Raw(line.to_string()))
    }

    /// The line written to the device, without terminator
    pub fn to_line(&self) -> String {
        match self {
            Self::Status => "STATUS".to_string(),
            Self::Start { ranges } if ranges.is_empty() => "START".to_string(),
            Self::Start { ranges } => format!("START {}", ranges.join(" ")),
            Self::Stop => "STOP".to_string(),
            Self::Calibrate { component, weight } => match weight {
                Some(w) => format!("CALIBRATE_{} {}", component, format_weight(*w)),
                None => format!("CALIBRATE_{}", component),
            },
            Self::Home => "HOME".to_string(),
            Self::Raw(line) => line.clone(),
        }
    }

    /// Budget class
    pub fn class(&self) -> CommandClass {
        match self {
            Self::Status => CommandClass::Query,
            Self::Calibrate { .. } => CommandClass::Calibration,
            Self::Start { .. } | Self::Stop | Self::Home => CommandClass::Cycle,
            Self::Raw(_) => CommandClass::Raw,
        }
    }

    /// Whether received lines are forwarded as progress events
    ///
    /// Homing shares the cycle budget but is not part of a sorting run.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Self::Calibrate { .. } | Self::Start { .. } | Self::Stop
        )
    }

    /// Whether `marker` ends the exchange for this command
    pub fn completes_on(&self, marker: Marker) -> bool {
        match self {
            Self::Status => marker == Marker::StatusEnd,
            Self::Calibrate { .. } => marker == Marker::CalibrationComplete,
            // The cycle keeps running after the acknowledgement; its lines
            // are followed outside the exchange so STOP is not held up.
            Self::Start { .. } => matches!(marker, Marker::SystemStarted | Marker::SystemStopped),
            Self::Stop => matches!(marker, Marker::StopAck | Marker::SystemStopped),
            Self::Home => marker == Marker::HomeComplete,
            Self::Raw(_) => marker != Marker::CalibrationStart,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Print integral weights without a fraction, as the firmware parses ints
fn format_weight(weight: f64) -> String {
    if weight.fract() == 0.0 && weight.abs() < 1e15 {
        format!("{}", weight as i64)
    } else {
        format!("{}", weight)
    }
}

/// Read budget for one command: wall-clock time and line count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Overall time limit in milliseconds
    pub timeout_ms: u64,
    /// Maximum lines read
    pub max_lines: usize,
}

impl Budget {
    /// Create a budget
    pub const fn new(timeout_ms: u64, max_lines: usize) -> Self {
        Self {
            timeout_ms,
            max_lines,
        }
    }

    /// Time limit as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Budgets per command class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budgets {
    /// Status queries
    pub query: Budget,
    /// Calibration commands
    pub calibration: Budget,
    /// Start, stop and home
    pub cycle: Budget,
    /// Pass-through lines
    pub raw: Budget,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            query: Budget::new(5_000, 50),
            calibration: Budget::new(15_000, 200),
            cycle: Budget::new(120_000, 1_000),
            raw: Budget::new(5_000, 50),
        }
    }
}

impl Budgets {
    /// Budget for a command class
    pub fn for_class(&self, class: CommandClass) -> Budget {
        match class {
            CommandClass::Query => self.query,
            CommandClass::Calibration => self.calibration,
            CommandClass::Cycle => self.cycle,
            CommandClass::Raw => self.raw,
        }
    }

    /// Reject zero budgets
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, budget) in [
            ("query", self.query),
            ("calibration", self.calibration),
            ("cycle", self.cycle),
            ("raw", self.raw),
        ] {
            if budget.timeout_ms == 0 || budget.max_lines == 0 {
                return Err(ValidationError::InvalidValue {
                    field: format!("budgets.{}", name),
                    reason: "timeout and line count must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}
