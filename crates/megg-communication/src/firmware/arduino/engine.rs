//! Protocol Engine
//!
//! Serializes request/response exchanges over the device link. Callers
//! queue on an async mutex; the exchange itself (write, then read until a
//! completion marker, an error marker or the budget runs out) runs on the
//! blocking pool because serial reads block.
//!
//! A sorting cycle outlives its `START` exchange. Once the device confirms
//! the start, a follower task keeps reading the cycle's lines in short polls,
//! giving the link back between polls so `STOP` can be sent at any time.

use async_trait::async_trait;
use chrono::Utc;
use megg_core::{
    CalibrationOutcome, CalibrationStatus, CommandReport, ConnectionError, DeviceStatus, Event,
    EventSink, ProtocolError,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::command_creator::{Budget, Budgets, Command};
use super::response_parser::{classify_for, LineClass, Marker};
use crate::communication::device_link::DeviceLink;

/// Longest single hold of the link while following a running cycle
const CYCLE_POLL: Duration = Duration::from_millis(100);

/// How an exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// A completion marker for the command arrived
    Completed(Marker),
    /// An error line arrived
    DeviceError(String),
    /// The time or line budget ran out first
    TimedOut,
}

/// Everything received for one command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// The line that was sent
    pub command: String,
    /// Every line received, in order
    pub lines: Vec<String>,
    /// How the exchange ended
    pub completion: Completion,
}

impl CommandOutcome {
    /// True when a completion marker ended the exchange
    pub fn is_success(&self) -> bool {
        matches!(self.completion, Completion::Completed(_))
    }

    /// The error line, if one ended the exchange
    pub fn error_line(&self) -> Option<&str> {
        match &self.completion {
            Completion::DeviceError(line) => Some(line),
            _ => None,
        }
    }

    /// The last line received
    pub fn last_line(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    /// The completion marker, or the protocol failure that replaced it
    pub fn check(&self) -> Result<Marker, ProtocolError> {
        match &self.completion {
            Completion::Completed(marker) => Ok(*marker),
            Completion::DeviceError(line) => Err(ProtocolError::DeviceError { line: line.clone() }),
            Completion::TimedOut => Err(ProtocolError::NotConfirmed {
                command: self.command.clone(),
                lines: self.lines.len(),
            }),
        }
    }

    /// One-line description of the completion
    pub fn summary(&self) -> String {
        match self.check() {
            Ok(_) => format!("{} completed", self.command),
            Err(e) => e.to_string(),
        }
    }

    /// Report payload for command and sorting results
    pub fn into_report(self) -> CommandReport {
        let message = self.summary();
        CommandReport {
            success: self.is_success(),
            command: self.command,
            response: self.lines,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Anything that can run a device command
///
/// The calibration router and the dispatcher depend on this rather than on
/// the engine, so they can be tested without a device.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Whether the device link is open
    fn is_connected(&self) -> bool;

    /// Run one command exchange
    async fn execute(&self, command: Command) -> Result<CommandOutcome, ConnectionError>;
}

/// The single owner of device exchanges
#[derive(Clone)]
pub struct ProtocolEngine {
    link: Arc<Mutex<DeviceLink>>,
    status: Arc<RwLock<DeviceStatus>>,
    budgets: Budgets,
    events: EventSink,
    following: Arc<AtomicBool>,
    cycle_poll: Duration,
}

impl ProtocolEngine {
    /// Wrap a (usually still closed) link
    pub fn new(link: DeviceLink, budgets: Budgets, events: EventSink) -> Self {
        let status = DeviceStatus::disconnected(link.params().baud_rate);
        let cycle_poll = link.params().read_timeout().min(CYCLE_POLL);
        Self {
            link: Arc::new(Mutex::new(link)),
            status: Arc::new(RwLock::new(status)),
            budgets,
            events,
            following: Arc::new(AtomicBool::new(false)),
            cycle_poll,
        }
    }

    /// Read budgets in use
    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    /// Snapshot of the device status
    pub fn status(&self) -> DeviceStatus {
        self.status.read().clone()
    }

    /// Open the link, trying every candidate port
    ///
    /// Waits for any in-flight exchange first.
    pub async fn connect(&self) -> Result<String, ConnectionError> {
        let mut link = self.link.clone().lock_owned().await;
        let (result, last_probe) = tokio::task::spawn_blocking(move || {
            let result = link.connect();
            (result, link.last_probe())
        })
        .await
        .map_err(worker_failed)?;

        match &result {
            Ok(port) => {
                {
                    let mut status = self.status.write();
                    status.connected = true;
                    status.port = Some(port.clone());
                    status.last_probe = last_probe;
                    status.system_active = false;
                }
                self.events.emit(Event::ArduinoStatus {
                    connected: true,
                    port: Some(port.clone()),
                    message: "Arduino connected successfully".to_string(),
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                tracing::warn!("Arduino connection failed: {}", e);
                self.status.write().connected = false;
                self.events.emit(Event::ArduinoStatus {
                    connected: false,
                    port: None,
                    message: format!("Failed to connect to Arduino: {}", e),
                    timestamp: Utc::now(),
                });
            }
        }
        result
    }

    /// Close the link; safe to call when already closed
    pub async fn disconnect(&self) {
        let mut link = self.link.clone().lock_owned().await;
        let was_open = link.is_connected();
        if let Err(e) = tokio::task::spawn_blocking(move || link.disconnect()).await {
            tracing::error!("Disconnect worker failed: {}", e);
        }

        let port = {
            let mut status = self.status.write();
            status.connected = false;
            status.system_active = false;
            status.port.clone()
        };
        if was_open {
            self.events.emit(Event::ArduinoStatus {
                connected: false,
                port,
                message: "Arduino disconnected".to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Whether a follower is reading a running sorting cycle
    pub fn is_following_cycle(&self) -> bool {
        self.following.load(Ordering::Acquire)
    }

    fn spawn_cycle_follower(&self) {
        if self
            .following
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                engine.follow_cycle().await;
                engine.following.store(false, Ordering::Release);
                // A new cycle may have started while this one wound down.
                if !engine.cycle_active()
                    || engine
                        .following
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    break;
                }
            }
        });
    }

    fn cycle_active(&self) -> bool {
        self.status.read().system_active
    }

    async fn follow_cycle(&self) {
        tracing::debug!("Following sorting cycle");
        loop {
            if !self.cycle_active() {
                break;
            }
            let mut link = self.link.clone().lock_owned().await;
            if !link.is_connected() || !self.cycle_active() {
                break;
            }

            let status = self.status.clone();
            let events = self.events.clone();
            let poll = self.cycle_poll;
            let result = tokio::task::spawn_blocking(move || {
                follow_step(&mut link, poll, &status, &events)
            })
            .await
            .map_err(worker_failed)
            .and_then(|r| r);

            if let Err(e) = result {
                self.mark_link_lost(&e);
                break;
            }
        }
        tracing::debug!("Sorting cycle no longer active");
    }

    fn mark_link_lost(&self, err: &ConnectionError) {
        let port = {
            let mut status = self.status.write();
            if !status.connected {
                return;
            }
            status.connected = false;
            status.system_active = false;
            status.port.clone()
        };
        self.events.emit(Event::ArduinoStatus {
            connected: false,
            port,
            message: format!("Arduino disconnected: {}", err),
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl CommandExecutor for ProtocolEngine {
    fn is_connected(&self) -> bool {
        self.status.read().connected
    }

    async fn execute(&self, command: Command) -> Result<CommandOutcome, ConnectionError> {
        let mut link = self.link.clone().lock_owned().await;
        if !link.is_connected() {
            return Err(ConnectionError::NotConnected);
        }

        let budget = self.budgets.for_class(command.class());
        let starts_cycle = matches!(command, Command::Start { .. });
        let status = self.status.clone();
        let events = self.events.clone();
        tracing::info!("Sending to Arduino: {}", command);

        let result = tokio::task::spawn_blocking(move || {
            run_exchange(&mut link, &command, budget, &status, &events)
        })
        .await
        .map_err(worker_failed)
        .and_then(|r| r);

        match &result {
            Ok(outcome) => {
                tracing::debug!(
                    "{} finished: {:?} after {} line(s)",
                    outcome.command,
                    outcome.completion,
                    outcome.lines.len()
                );
                if starts_cycle && outcome.completion == Completion::Completed(Marker::SystemStarted)
                {
                    self.spawn_cycle_follower();
                }
            }
            Err(e) => self.mark_link_lost(e),
        }
        result
    }
}

fn worker_failed(err: tokio::task::JoinError) -> ConnectionError {
    ConnectionError::ConnectionLost {
        reason: format!("serial worker failed: {}", err),
    }
}

/// Write `command` and read until it completes, fails or runs out of budget
fn run_exchange(
    link: &mut DeviceLink,
    command: &Command,
    budget: Budget,
    status: &RwLock<DeviceStatus>,
    events: &EventSink,
) -> Result<CommandOutcome, ConnectionError> {
    let sent = command.to_line();
    link.clear()?;
    link.write_line(&sent)?;
    std::thread::sleep(link.params().command_settle());

    let deadline = Instant::now() + budget.timeout();
    let read_timeout = link.params().read_timeout();
    let mut lines = Vec::new();

    let completion = loop {
        if lines.len() >= budget.max_lines {
            tracing::warn!("{}: line budget of {} exhausted", sent, budget.max_lines);
            break Completion::TimedOut;
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::warn!("{}: no completion within {:?}", sent, budget.timeout());
            break Completion::TimedOut;
        }

        let Some(line) = link.read_line((deadline - now).min(read_timeout))? else {
            continue;
        };
        let class = classify_for(command, &line);
        observe_line(command, &line, &class, status, events);
        lines.push(line);

        match class {
            LineClass::Terminator(marker) => break Completion::Completed(marker),
            LineClass::Error(message) => break Completion::DeviceError(message),
            LineClass::Info(_) => {}
        }
    };

    Ok(CommandOutcome {
        command: sent,
        lines,
        completion,
    })
}

/// Read lines of a running cycle for at most `poll`
fn follow_step(
    link: &mut DeviceLink,
    poll: Duration,
    status: &RwLock<DeviceStatus>,
    events: &EventSink,
) -> Result<(), ConnectionError> {
    let cycle = Command::Start { ranges: Vec::new() };
    let deadline = Instant::now() + poll;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        let Some(line) = link.read_line(deadline - now)? else {
            return Ok(());
        };
        let class = classify_for(&cycle, &line);
        observe_line(&cycle, &line, &class, status, events);
        if !status.read().system_active {
            return Ok(());
        }
    }
}

/// Update device status and forward the line to observers
fn observe_line(
    command: &Command,
    line: &str,
    class: &LineClass,
    status: &RwLock<DeviceStatus>,
    events: &EventSink,
) {
    let now = Utc::now();
    let marker = match class {
        LineClass::Terminator(m) | LineClass::Info(Some(m)) => Some(*m),
        _ => None,
    };

    {
        let mut status = status.write();
        status.last_ping = Some(now);
        match marker {
            Some(Marker::SystemStarted) => status.system_active = true,
            Some(Marker::SystemStopped | Marker::StopAck) => status.system_active = false,
            _ => {}
        }
    }

    events.emit(Event::ArduinoData {
        message: line.to_string(),
        timestamp: now,
    });

    if !command.is_streaming() {
        return;
    }
    match command {
        Command::Calibrate { component, .. } => {
            let progress = if marker == Some(Marker::CalibrationStart) {
                CalibrationStatus::Started
            } else {
                CalibrationStatus::InProgress
            };
            events.emit(Event::CalibrationProgress(CalibrationOutcome {
                component: component.to_string(),
                status: progress,
                success: !matches!(class, LineClass::Error(_)),
                message: line.to_string(),
                timestamp: now,
            }));
        }
        _ => {
            events.emit(Event::SortingProgress {
                message: line.to_string(),
                timestamp: now,
            });
        }
    }
}
