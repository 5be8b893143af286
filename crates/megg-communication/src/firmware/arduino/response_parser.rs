//! Rig Controller Response Parser
//!
//! Classifies the free-form lines printed by the controller firmware. The
//! firmware has no framing, so recognition is by substring: anything
//! containing `ERROR` is an error, a handful of upper-case tokens are
//! lifecycle markers, everything else is informational chatter.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::command_creator::Command;

/// Lifecycle markers printed by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    /// `CALIBRATION_START:<c>`
    CalibrationStart,
    /// `CALIBRATION_COMPLETE:<c>` or the older "calibration complete(d)" text
    CalibrationComplete,
    /// `SYSTEM_STARTED`
    SystemStarted,
    /// `SYSTEM_STOPPED`
    SystemStopped,
    /// `STOP_ACK`
    StopAck,
    /// Closing banner of a status report
    StatusEnd,
    /// `HOME_COMPLETE`
    HomeComplete,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CalibrationStart => "CALIBRATION_START",
            Self::CalibrationComplete => "CALIBRATION_COMPLETE",
            Self::SystemStarted => "SYSTEM_STARTED",
            Self::SystemStopped => "SYSTEM_STOPPED",
            Self::StopAck => "STOP_ACK",
            Self::StatusEnd => "STATUS_END",
            Self::HomeComplete => "HOME_COMPLETE",
        };
        f.write_str(s)
    }
}

/// Context-free kind of a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Error line, verbatim
    Error(String),
    /// Lifecycle marker
    Marker(Marker),
    /// Anything else
    Info,
}

/// Kind of a line relative to the command being executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Ends the exchange successfully
    Terminator(Marker),
    /// Ends the exchange with a device error
    Error(String),
    /// Keeps reading; carries a marker that does not end this command
    Info(Option<Marker>),
}

/// Classify a line on its own
pub fn classify(line: &str) -> LineKind {
    let line = line.trim();

    // Error markers win over everything else on the same line.
    if line.contains("ERROR") {
        return LineKind::Error(line.to_string());
    }

    if line.contains("CALIBRATION_START") {
        return LineKind::Marker(Marker::CalibrationStart);
    }
    if line.contains("CALIBRATION_COMPLETE")
        || line.to_ascii_lowercase().contains("calibration complete")
    {
        return LineKind::Marker(Marker::CalibrationComplete);
    }
    if line.contains("SYSTEM_STARTED") {
        return LineKind::Marker(Marker::SystemStarted);
    }
    if line.contains("SYSTEM_STOPPED") {
        return LineKind::Marker(Marker::SystemStopped);
    }
    if line.contains("STOP_ACK") {
        return LineKind::Marker(Marker::StopAck);
    }
    if line.contains("HOME_COMPLETE") {
        return LineKind::Marker(Marker::HomeComplete);
    }
    if line.contains("STATUS_END") || is_banner_rule(line) {
        return LineKind::Marker(Marker::StatusEnd);
    }

    LineKind::Info
}

/// Classify a line received while `command` is outstanding
pub fn classify_for(command: &Command, line: &str) -> LineClass {
    match classify(line) {
        LineKind::Error(message) => LineClass::Error(message),
        LineKind::Marker(marker) if command.completes_on(marker) => LineClass::Terminator(marker),
        LineKind::Marker(marker) => LineClass::Info(Some(marker)),
        LineKind::Info => LineClass::Info(None),
    }
}

fn is_banner_rule(line: &str) -> bool {
    line.len() >= 3 && line.chars().all(|c| c == '=')
}

#[cfg(test)]
mod tests {
    use super::*;
    use megg_core::Component;

    #[test]
    fn test_error_lines() {
        assert_eq!(
            classify("ERROR:HX711 not responding"),
            LineKind::Error("ERROR:HX711 not responding".to_string())
        );
        // An error on a marker line is still an error
        assert!(matches!(
            classify("CALIBRATION_COMPLETE:SG90 ERROR"),
            LineKind::Error(_)
        ));
    }

    #[test]
    fn test_markers() {
        assert_eq!(
            classify("CALIBRATION_START:HX711"),
            LineKind::Marker(Marker::CalibrationStart)
        );
        assert_eq!(
            classify("CALIBRATION_COMPLETE:HX711"),
            LineKind::Marker(Marker::CalibrationComplete)
        );
        assert_eq!(
            classify("SG90 calibration completed"),
            LineKind::Marker(Marker::CalibrationComplete)
        );
        assert_eq!(classify("SYSTEM_STARTED"), LineKind::Marker(Marker::SystemStarted));
        assert_eq!(classify("SYSTEM_STOPPED"), LineKind::Marker(Marker::SystemStopped));
        assert_eq!(classify("STOP_ACK"), LineKind::Marker(Marker::StopAck));
        assert_eq!(classify("HOME_COMPLETE"), LineKind::Marker(Marker::HomeComplete));
        assert_eq!(
            classify("=========================="),
            LineKind::Marker(Marker::StatusEnd)
        );
        assert_eq!(classify("STATUS_END"), LineKind::Marker(Marker::StatusEnd));
    }

    #[test]
    fn test_info_lines() {
        assert_eq!(classify("=== MEGG SYSTEM STATUS ==="), LineKind::Info);
        assert_eq!(classify("=="), LineKind::Info);
        assert_eq!(classify("HX711: Running self-test..."), LineKind::Info);
        assert_eq!(classify("error: lower case is chatter"), LineKind::Info);
    }

    #[test]
    fn test_classify_for_command() {
        let calibrate = Command::calibrate(Component::Hx711, None);
        assert_eq!(
            classify_for(&calibrate, "CALIBRATION_START:HX711"),
            LineClass::Info(Some(Marker::CalibrationStart))
        );
        assert_eq!(
            classify_for(&calibrate, "CALIBRATION_COMPLETE:HX711"),
            LineClass::Terminator(Marker::CalibrationComplete)
        );

        let start = Command::start(["1-2"]).unwrap();
        assert_eq!(
            classify_for(&start, "SYSTEM_STARTED"),
            LineClass::Terminator(Marker::SystemStarted)
        );
        assert_eq!(
            classify_for(&start, "SYSTEM_STOPPED"),
            LineClass::Terminator(Marker::SystemStopped)
        );
        assert_eq!(
            classify_for(&Command::Home, "SYSTEM_STARTED"),
            LineClass::Info(Some(Marker::SystemStarted))
        );
        assert_eq!(
            classify_for(&Command::Status, "ERROR:busy"),
            LineClass::Error("ERROR:busy".to_string())
        );
    }
}
