//! Routes client requests to the calibration router, the protocol engine
//! and the work process.
//!
//! Direct replies go to the requesting observer only. Results of
//! hardware-bound work are broadcast through the event bridge so they stay
//! ordered behind the progress events of the same exchange. Hardware-bound
//! work runs on spawned tasks and never holds up the requester's socket.

use chrono::Utc;
use megg_communication::{Command, CommandExecutor, CommandOutcome};
use megg_core::{
    Batch, BroadcastError, CalibrationOutcome, CommandReport, Error, Event, ObserverId,
    ValidationError, WorkProcessResponse,
};

use super::messages::{self, ClientMessage};
use super::AppState;

/// Handles the text frames of every connection
#[derive(Clone)]
pub struct Dispatcher {
    state: AppState,
}

impl Dispatcher {
    /// Dispatcher over the shared state
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Shared state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Greet a freshly registered observer
    pub fn greet(&self, observer: ObserverId) {
        self.reply(observer, Event::Connection(self.state.welcome()));
        self.reply(
            observer,
            Event::SystemStatus(Box::new(self.state.system_status())),
        );
    }

    /// Handle one text frame from `observer`
    pub async fn handle(&self, observer: ObserverId, text: &str) {
        let message = match messages::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Rejected frame from {}: {}", observer, e.message());
                self.reply(observer, Event::error(e.message()));
                return;
            }
        };

        match message {
            ClientMessage::Ping => self.reply(observer, Event::pong()),
            ClientMessage::GetStatus => self.reply(
                observer,
                Event::SystemStatus(Box::new(self.state.system_status())),
            ),
            ClientMessage::CalibrationRequest { component, weight } => {
                self.calibration_request(observer, component, weight)
            }
            ClientMessage::WorkProcess {
                action,
                batch_id,
                egg_count,
            } => self.work_process(observer, action, batch_id, egg_count),
            ClientMessage::SetConfiguration {
                account_id,
                configurations,
            } => self.set_configuration(observer, account_id, configurations),
            ClientMessage::SendCommand { command } => self.send_command(observer, command),
            ClientMessage::StartSorting { ranges } => self.start_sorting(observer, ranges),
            ClientMessage::StopSorting => self.stop_sorting(observer),
        }
    }

    fn reply(&self, observer: ObserverId, event: Event) {
        match self.state.broadcaster().send_to(observer, &event) {
            Ok(()) => {}
            Err(BroadcastError::UnknownObserver(_) | BroadcastError::ObserverGone(_)) => {
                tracing::debug!("Dropped {} reply for departed {}", event.kind(), observer)
            }
            Err(e) => tracing::error!("Failed to reply to {}: {}", observer, e),
        }
    }

    fn calibration_request(
        &self,
        observer: ObserverId,
        component: Option<String>,
        weight: Option<serde_json::Value>,
    ) {
        let component = component.unwrap_or_default();
        let label = match component.trim() {
            "" => "unknown".to_string(),
            name => name.to_ascii_uppercase(),
        };

        let weight = match weight {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => match messages::weight_value(&value) {
                Some(w) => Some(w),
                None => {
                    let err = ValidationError::InvalidValue {
                        field: "weight".to_string(),
                        reason: format!("{} is not a number", value),
                    };
                    self.reply(
                        observer,
                        Event::CalibrationResult(CalibrationOutcome::failed(
                            label,
                            err.to_string(),
                        )),
                    );
                    return;
                }
            },
        };

        tracing::info!("Calibration request for {}", label);
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.state.calibration().calibrate(&component, weight).await {
                Ok(outcome) => {
                    dispatcher.state.events().emit(Event::CalibrationResult(outcome));
                }
                Err(e) => {
                    tracing::warn!("Calibration request for {} rejected: {}", label, e);
                    dispatcher.reply(
                        observer,
                        Event::CalibrationResult(CalibrationOutcome::failed(label, e.to_string())),
                    );
                }
            }
        });
    }

    fn work_process(
        &self,
        observer: ObserverId,
        action: Option<String>,
        batch_id: Option<String>,
        egg_count: Option<serde_json::Value>,
    ) {
        let process = self.state.process();
        let action = action.unwrap_or_default();

        let response = match action.as_str() {
            "start_batch" => self.start_batch(batch_id, egg_count),
            "stop_processing" => match process.stop() {
                Ok(stats) => {
                    let mut response =
                        WorkProcessResponse::new(&action, true, "Processing stopped");
                    response.stats = Some(stats);
                    response
                }
                Err(e) => WorkProcessResponse::new(&action, false, e.to_string()),
            },
            "reset_process" => match process.reset() {
                Ok(()) => WorkProcessResponse::new(&action, true, "Process reset successfully"),
                Err(e) => WorkProcessResponse::new(&action, false, e.to_string()),
            },
            "get_status" => {
                self.reply(observer, Event::WorkProcessStatus(process.snapshot()));
                return;
            }
            other => WorkProcessResponse::new(
                other,
                false,
                format!("Unknown work process action: {}", other),
            ),
        };

        self.reply(observer, Event::WorkProcessResponse(response));
    }

    fn start_batch(
        &self,
        batch_id: Option<String>,
        egg_count: Option<serde_json::Value>,
    ) -> WorkProcessResponse {
        let process = self.state.process();
        let egg_count = match egg_count.filter(|v| !v.is_null()) {
            None => Ok(i64::from(process.config().default_egg_count)),
            Some(value) => messages::count_value(&value).ok_or(value),
        };
        let egg_count = match egg_count {
            Ok(n) => match u32::try_from(n) {
                Ok(n) if n > 0 => n,
                _ => return invalid_count(&n.to_string()),
            },
            Err(value) => return invalid_count(&value.to_string()),
        };
        let batch_id = batch_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(Batch::default_id);

        let mut response = match process.start_batch(batch_id, egg_count) {
            Ok(batch) => {
                let mut response = WorkProcessResponse::new(
                    "start_batch",
                    true,
                    format!("Batch {} started successfully", batch.id),
                );
                response.batch = Some(batch);
                response
            }
            Err(e) => {
                tracing::warn!("Failed to start batch: {}", e);
                WorkProcessResponse::new("start_batch", false, e.to_string())
            }
        };
        response.status = Some(process.state());
        response
    }

    fn set_configuration(
        &self,
        observer: ObserverId,
        account_id: Option<String>,
        configurations: Option<serde_json::Value>,
    ) {
        let account_id = account_id.filter(|id| !id.trim().is_empty());
        let (success, message) = match &account_id {
            Some(id) => {
                self.state
                    .store_configuration(id.clone(), configurations.unwrap_or_default());
                tracing::info!("Stored configuration for account {}", id);
                (true, "Configuration saved".to_string())
            }
            None => (
                false,
                ValidationError::MissingField {
                    field: "accountId".to_string(),
                }
                .to_string(),
            ),
        };

        self.reply(
            observer,
            Event::ConfigurationResult {
                success,
                account_id,
                message,
                timestamp: Utc::now(),
            },
        );
    }

    fn send_command(&self, observer: ObserverId, command: Option<String>) {
        let raw = command.unwrap_or_default();
        let command = match Command::raw(&raw) {
            Ok(command) => command,
            Err(e) => {
                self.reply(observer, Event::CommandResult(report(raw, Err(e.into()))));
                return;
            }
        };

        let dispatcher = self.clone();
        tokio::spawn(async move {
            let report = dispatcher.run(command).await;
            dispatcher.reply(observer, Event::CommandResult(report));
        });
    }

    fn start_sorting(&self, observer: ObserverId, ranges: Option<Vec<String>>) {
        let command = match Command::start(ranges.unwrap_or_default()) {
            Ok(command) => command,
            Err(e) => {
                let report = report("START".to_string(), Err(e.into()));
                self.reply(observer, Event::SortingResult(report));
                return;
            }
        };

        self.reply(
            observer,
            Event::SortingAck {
                action: "start_sorting".to_string(),
                message: "Sorting start requested".to_string(),
                timestamp: Utc::now(),
            },
        );
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let report = dispatcher.run(command).await;
            dispatcher.state.events().emit(Event::SortingResult(report));
        });
    }

    fn stop_sorting(&self, observer: ObserverId) {
        self.reply(
            observer,
            Event::SortingAck {
                action: "stop_sorting".to_string(),
                message: "Sorting stop requested".to_string(),
                timestamp: Utc::now(),
            },
        );
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let report = dispatcher.run(Command::Stop).await;
            dispatcher.state.events().emit(Event::SortingStopResult(report));
        });
    }

    async fn run(&self, command: Command) -> CommandReport {
        let line = command.to_line();
        let result = self.state.engine().execute(command).await.map_err(Error::from);
        report(line, result)
    }
}

fn invalid_count(given: &str) -> WorkProcessResponse {
    let err = ValidationError::InvalidValue {
        field: "egg_count".to_string(),
        reason: format!("{} is not a positive count", given),
    };
    WorkProcessResponse::new("start_batch", false, err.to_string())
}

/// Report for a finished exchange or a request that never reached the device
fn report(command: String, result: Result<CommandOutcome, Error>) -> CommandReport {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.is_connection_error() {
                tracing::warn!("{} failed: {}", command, e);
            } else {
                tracing::debug!("{} rejected: {}", command, e);
            }
            return CommandReport {
                command,
                success: false,
                response: Vec::new(),
                message: e.to_string(),
                timestamp: Utc::now(),
            };
        }
    };

    if let Err(e) = outcome.check() {
        tracing::warn!("{}", Error::from(e));
    }
    outcome.into_report()
}
