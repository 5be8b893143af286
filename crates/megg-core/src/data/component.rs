//! Hardware components and their calibration state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ValidationError;

/// A calibratable part of the rig
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    /// Arduino UNO controller board
    Uno,
    /// HX711 load-cell amplifier
    Hx711,
    /// NEMA23 conveyor stepper
    Nema23,
    /// SG90 micro servo
    Sg90,
    /// MG996R sorting servo
    Mg996r,
    /// Any other well-formed identifier, handled by the generic flow
    Other(String),
}

impl Component {
    /// Components tracked by the work-process readiness gate
    pub const TRACKED: [Component; 5] = [
        Component::Uno,
        Component::Hx711,
        Component::Nema23,
        Component::Sg90,
        Component::Mg996r,
    ];

    /// Upper-case identifier as used on the wire and in device verbs
    pub fn name(&self) -> &str {
        match self {
            Self::Uno => "UNO",
            Self::Hx711 => "HX711",
            Self::Nema23 => "NEMA23",
            Self::Sg90 => "SG90",
            Self::Mg996r => "MG996R",
            Self::Other(name) => name,
        }
    }

    /// True for one of the five known rig components
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Names of the known components, in rig order
    pub fn supported() -> Vec<&'static str> {
        vec!["UNO", "HX711", "NEMA23", "SG90", "MG996R"]
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Component {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField {
                field: "Component".to_string(),
            });
        }
        // The identifier ends up inside a device verb, so it must stay one token.
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ValidationError::InvalidComponent {
                component: trimmed.to_string(),
            });
        }

        let upper = trimmed.to_ascii_uppercase();
        Ok(match upper.as_str() {
            "UNO" => Self::Uno,
            "HX711" => Self::Hx711,
            "NEMA23" => Self::Nema23,
            "SG90" => Self::Sg90,
            "MG996R" => Self::Mg996r,
            _ => Self::Other(upper),
        })
    }
}

impl Serialize for Component {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Component {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Calibration state of a single component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationState {
    /// Never calibrated in this session
    #[default]
    Unknown,
    /// A calibration command is outstanding
    Calibrating,
    /// Last calibration succeeded
    Calibrated,
    /// Last calibration failed
    Failed,
}

/// Per-component status record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Current calibration state
    pub status: CalibrationState,
    /// When the last calibration attempt finished
    pub last_calibration: Option<DateTime<Utc>>,
}

impl ComponentStatus {
    /// A component is ready once it has been calibrated successfully
    pub fn is_ready(&self) -> bool {
        self.status == CalibrationState::Calibrated
    }
}

/// Shared component status table
///
/// Written by the calibration router, read by the work-process readiness
/// gate. Cloning yields another handle to the same table.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    inner: Arc<RwLock<BTreeMap<Component, ComponentStatus>>>,
}

impl ComponentRegistry {
    /// Create a registry tracking the known components, all `Unknown`
    pub fn new() -> Self {
        let map = Component::TRACKED
            .iter()
            .cloned()
            .map(|c| (c, ComponentStatus::default()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Atomically mark a component as calibrating
    ///
    /// Fails without side effects if it is already calibrating.
    pub fn try_begin_calibration(&self, component: &Component) -> Result<(), ValidationError> {
        let mut map = self.inner.write();
        let entry = map.entry(component.clone()).or_default();
        if entry.status == CalibrationState::Calibrating {
            return Err(ValidationError::AlreadyCalibrating {
                component: component.to_string(),
            });
        }
        entry.status = CalibrationState::Calibrating;
        Ok(())
    }

    /// Record the outcome of a calibration attempt
    pub fn finish_calibration(&self, component: &Component, success: bool) {
        let mut map = self.inner.write();
        let entry = map.entry(component.clone()).or_default();
        entry.status = if success {
            CalibrationState::Calibrated
        } else {
            CalibrationState::Failed
        };
        entry.last_calibration = Some(Utc::now());
    }

    /// Check whether a component has an outstanding calibration
    pub fn is_calibrating(&self, component: &Component) -> bool {
        self.inner
            .read()
            .get(component)
            .is_some_and(|s| s.status == CalibrationState::Calibrating)
    }

    /// Status of a single component
    pub fn status(&self, component: &Component) -> Option<ComponentStatus> {
        self.inner.read().get(component).cloned()
    }

    /// True when every tracked component is calibrated
    pub fn all_ready(&self) -> bool {
        let map = self.inner.read();
        Component::TRACKED
            .iter()
            .all(|c| map.get(c).is_some_and(ComponentStatus::is_ready))
    }

    /// Readiness of each tracked component, keyed by name
    pub fn readiness(&self) -> BTreeMap<String, bool> {
        let map = self.inner.read();
        Component::TRACKED
            .iter()
            .map(|c| {
                (
                    c.to_string(),
                    map.get(c).is_some_and(ComponentStatus::is_ready),
                )
            })
            .collect()
    }

    /// Full status table, keyed by name
    pub fn snapshot(&self) -> BTreeMap<String, ComponentStatus> {
        self.inner
            .read()
            .iter()
            .map(|(c, s)| (c.to_string(), s.clone()))
            .collect()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
