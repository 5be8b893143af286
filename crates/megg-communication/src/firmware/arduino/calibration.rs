//! Calibration Router
//!
//! Turns a calibration request into a device command and interprets the
//! lines that come back into a single verdict.

use chrono::Utc;
use megg_core::{
    CalibrationOutcome, CalibrationStatus, Component, ComponentRegistry, ProtocolError,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::command_creator::Command;
use super::engine::{CommandExecutor, CommandOutcome};

/// How a calibration with no completion and no error marker is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationPolicy {
    /// Treat silence as success, like older firmware expects
    #[default]
    Lenient,
    /// Require an explicit completion marker
    Strict,
}

/// Routes calibration requests to the device
#[derive(Clone)]
pub struct CalibrationRouter {
    executor: Arc<dyn CommandExecutor>,
    components: ComponentRegistry,
    policy: ConfirmationPolicy,
}

impl CalibrationRouter {
    /// Create a router over an executor and the shared component table
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        components: ComponentRegistry,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            executor,
            components,
            policy,
        }
    }

    /// Confirmation policy in use
    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Calibrate a component
    ///
    /// Validation problems (missing or malformed identifier, bad weight, a
    /// calibration already outstanding) are returned as errors and never
    /// reach the device. Everything else, including a disconnected device,
    /// yields an outcome.
    pub async fn calibrate(
        &self,
        component: &str,
        weight: Option<f64>,
    ) -> Result<CalibrationOutcome, ValidationError> {
        let component: Component = component.parse()?;
        if let Some(w) = weight {
            if !w.is_finite() || w <= 0.0 {
                return Err(ValidationError::InvalidValue {
                    field: "weight".to_string(),
                    reason: format!("{} is not a positive number", w),
                });
            }
        }

        if self.components.is_calibrating(&component) {
            return Err(ValidationError::AlreadyCalibrating {
                component: component.to_string(),
            });
        }

        if !self.executor.is_connected() {
            tracing::warn!("Calibration of {} requested while disconnected", component);
            return Ok(CalibrationOutcome::failed(
                component.to_string(),
                format!(
                    "Arduino not connected - cannot calibrate {}. Please check Arduino connection.",
                    component
                ),
            ));
        }

        self.components.try_begin_calibration(&component)?;
        let mut guard = CalibrationGuard {
            components: &self.components,
            component: &component,
            finished: false,
        };

        if !component.is_known() {
            tracing::info!("Calibrating {} with the generic flow", component);
        }
        tracing::info!("Starting calibration for {}", component);

        let outcome = match self
            .executor
            .execute(Command::calibrate(component.clone(), weight))
            .await
        {
            Ok(response) => self.interpret(&component, &response),
            Err(e) => {
                tracing::error!("Calibration of {} failed: {}", component, e);
                CalibrationOutcome::failed(
                    component.to_string(),
                    format!("{} calibration failed: {}", component, e),
                )
            }
        };

        guard.finish(outcome.success);
        tracing::info!("{}: {}", component, outcome.message);
        Ok(outcome)
    }

    fn interpret(&self, component: &Component, response: &CommandOutcome) -> CalibrationOutcome {
        let name = component.name();
        let mentions = |line: &&String| line.to_ascii_uppercase().contains(name);

        let (status, success, message) = match response.check() {
            Ok(_) => {
                let message = response
                    .lines
                    .iter()
                    .rev()
                    .filter(|l| {
                        !l.contains("CALIBRATION_COMPLETE") && !l.contains("CALIBRATION_START")
                    })
                    .find(mentions)
                    .cloned()
                    .unwrap_or_else(|| format!("{} calibration completed", name));
                (CalibrationStatus::Completed, true, message)
            }
            Err(ProtocolError::DeviceError { line }) => {
                let message = if line.to_ascii_uppercase().contains(name) {
                    line.clone()
                } else {
                    response
                        .lines
                        .iter()
                        .filter(|l| l.contains("ERROR"))
                        .find(mentions)
                        .cloned()
                        .unwrap_or_else(|| line.clone())
                };
                (CalibrationStatus::Failed, false, message)
            }
            Err(err @ ProtocolError::NotConfirmed { .. }) => match self.policy {
                ConfirmationPolicy::Lenient => {
                    tracing::warn!("{}; assuming {} is calibrated", err, name);
                    (
                        CalibrationStatus::Completed,
                        true,
                        format!("{} calibration completed", name),
                    )
                }
                ConfirmationPolicy::Strict => (
                    CalibrationStatus::Failed,
                    false,
                    format!("{} calibration not confirmed by device", name),
                ),
            },
        };

        CalibrationOutcome {
            component: name.to_string(),
            status,
            success,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Clears the calibrating mark even if the request future is dropped
struct CalibrationGuard<'a> {
    components: &'a ComponentRegistry,
    component: &'a Component,
    finished: bool,
}

impl CalibrationGuard<'_> {
    fn finish(&mut self, success: bool) {
        self.components.finish_calibration(self.component, success);
        self.finished = true;
    }
}

impl Drop for CalibrationGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.components.finish_calibration(self.component, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::arduino::engine::Completion;
    use crate::firmware::arduino::response_parser::Marker;
    use async_trait::async_trait;
    use megg_core::{CalibrationState, ConnectionError};

    struct Scripted {
        lines: Vec<&'static str>,
        completion: Completion,
    }

    #[async_trait]
    impl CommandExecutor for Scripted {
        fn is_connected(&self) -> bool {
            true
        }

        async fn execute(&self, command: Command) -> Result<CommandOutcome, ConnectionError> {
            Ok(CommandOutcome {
                command: command.to_line(),
                lines: self.lines.iter().map(|l| l.to_string()).collect(),
                completion: self.completion.clone(),
            })
        }
    }

    fn router(script: Scripted, policy: ConfirmationPolicy) -> (CalibrationRouter, ComponentRegistry) {
        let registry = ComponentRegistry::new();
        (
            CalibrationRouter::new(Arc::new(script), registry.clone(), policy),
            registry,
        )
    }

    #[tokio::test]
    async fn test_completed_uses_component_line() {
        let (router, registry) = router(
            Scripted {
                lines: vec![
                    "CALIBRATION_START:HX711",
                    "HX711: Calibration values stored",
                    "CALIBRATION_COMPLETE:HX711",
                ],
                completion: Completion::Completed(Marker::CalibrationComplete),
            },
            ConfirmationPolicy::Lenient,
        );

        let outcome = router.calibrate("hx711", None).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.status, CalibrationStatus::Completed);
        assert_eq!(outcome.message, "HX711: Calibration values stored");
        assert_eq!(
            registry.status(&Component::Hx711).unwrap().status,
            CalibrationState::Calibrated
        );
    }

    #[tokio::test]
    async fn test_error_line_is_the_message() {
        let (router, registry) = router(
            Scripted {
                lines: vec!["CALIBRATION_START:SG90", "ERROR:SG90 stalled"],
                completion: Completion::DeviceError("ERROR:SG90 stalled".to_string()),
            },
            ConfirmationPolicy::Lenient,
        );

        let outcome = router.calibrate("SG90", None).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "ERROR:SG90 stalled");
        assert_eq!(
            registry.status(&Component::Sg90).unwrap().status,
            CalibrationState::Failed
        );
    }

    #[tokio::test]
    async fn test_silence_depends_on_policy() {
        let silent = || Scripted {
            lines: vec!["CALIBRATION_START:NEMA23"],
            completion: Completion::TimedOut,
        };

        let (lenient, _) = router(silent(), ConfirmationPolicy::Lenient);
        let outcome = lenient.calibrate("NEMA23", None).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "NEMA23 calibration completed");

        let (strict, registry) = router(silent(), ConfirmationPolicy::Strict);
        let outcome = strict.calibrate("NEMA23", None).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "NEMA23 calibration not confirmed by device");
        assert!(!registry.all_ready());
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (router, _) = router(
            Scripted {
                lines: vec![],
                completion: Completion::TimedOut,
            },
            ConfirmationPolicy::Lenient,
        );
        assert!(matches!(
            router.calibrate("  ", None).await,
            Err(ValidationError::MissingField { .. })
        ));
        assert!(matches!(
            router.calibrate("HX 711", None).await,
            Err(ValidationError::InvalidComponent { .. })
        ));
        assert!(matches!(
            router.calibrate("HX711", Some(-5.0)).await,
            Err(ValidationError::InvalidValue { .. })
        ));
    }
}
