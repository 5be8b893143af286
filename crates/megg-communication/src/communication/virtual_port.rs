//! In-process emulation of the rig controller firmware.
//!
//! Used when no hardware is attached (simulation mode) and as the device
//! behind every hardware-bound test. The emulation answers the same verbs
//! and prints the same marker lines as the board firmware.

use megg_core::ConnectionError;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::serial::{PortOpener, SerialPort};
use super::ConnectionParams;

/// How the emulated firmware behaves
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualBehavior {
    /// Components whose calibration ends in an `ERROR:` line
    pub failing_components: HashSet<String>,
    /// Components whose calibration prints no completion or error marker
    pub unconfirmed_components: HashSet<String>,
    /// Print the old free-text completion line instead of the structured marker
    pub legacy_completion: bool,
    /// Never answer anything
    pub silent: bool,
    /// Eggs reported by one `START` cycle
    pub eggs_per_cycle: u32,
    /// Keep the cycle running after its eggs until `STOP` arrives
    pub run_until_stop: bool,
}

impl Default for VirtualBehavior {
    fn default() -> Self {
        Self {
            failing_components: HashSet::new(),
            unconfirmed_components: HashSet::new(),
            legacy_completion: false,
            silent: false,
            eggs_per_cycle: 3,
            run_until_stop: false,
        }
    }
}

#[derive(Debug, Default)]
struct DeviceState {
    behavior: VirtualBehavior,
    outbound: VecDeque<u8>,
    partial: String,
    received: Vec<String>,
    system_active: bool,
    link_broken: bool,
    opens: usize,
}

impl DeviceState {
    fn push_line(&mut self, line: &str) {
        self.outbound.extend(line.as_bytes());
        self.outbound.extend(b"\r\n");
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.received.push(line.to_string());
        if self.behavior.silent {
            return;
        }

        let mut parts = line.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_ascii_uppercase();
        let args: Vec<&str> = parts.collect();

        match verb.as_str() {
            "STATUS" => self.status_report(),
            "START" => self.sorting_cycle(&args),
            "STOP" => {
                self.system_active = false;
                self.push_line("STOP_ACK");
                self.push_line("SYSTEM_STOPPED");
            }
            "HOME" => {
                self.push_line("Homing servos...");
                self.push_line("HOME_COMPLETE");
            }
            _ => match verb.strip_prefix("CALIBRATE_") {
                Some(component) if !component.is_empty() => {
                    self.calibrate(component, args.first().copied())
                }
                _ => self.push_line(&format!("ERROR:Unknown command {}", line)),
            },
        }
    }

    fn status_report(&mut self) {
        let active = if self.system_active { "ACTIVE" } else { "IDLE" };
        self.push_line("=== MEGG SYSTEM STATUS ===");
        self.push_line(&format!("SYSTEM: {}", active));
        for component in ["UNO", "HX711", "NEMA23", "SG90", "MG996R"] {
            self.push_line(&format!("{}: READY", component));
        }
        self.push_line("==========================");
    }

    fn sorting_cycle(&mut self, ranges: &[&str]) {
        self.system_active = true;
        self.push_line("SYSTEM_STARTED");
        if !ranges.is_empty() {
            self.push_line(&format!("RANGES: {}", ranges.join(" ")));
        }
        let sizes = ["SMALL", "MEDIUM", "LARGE"];
        for n in 0..self.behavior.eggs_per_cycle {
            let size = sizes[(n as usize) % sizes.len()];
            self.push_line(&format!("EGG {}: {} -> BIN {}", n + 1, size, n % 3 + 1));
        }
        if !self.behavior.run_until_stop {
            self.system_active = false;
            self.push_line("SYSTEM_STOPPED");
        }
    }

    fn calibrate(&mut self, component: &str, weight: Option<&str>) {
        self.push_line(&format!("CALIBRATION_START:{}", component));
        if let Some(w) = weight {
            self.push_line(&format!("{}: Using reference weight {}g", component, w));
        }
        self.push_line(&format!("{}: Running self-test...", component));

        if self.behavior.failing_components.contains(component) {
            self.push_line(&format!(
                "ERROR:{} calibration failed - no response from hardware",
                component
            ));
        } else if self.behavior.unconfirmed_components.contains(component) {
            self.push_line(&format!("{}: Self-test finished", component));
        } else if self.behavior.legacy_completion {
            self.push_line(&format!("{} calibration completed", component));
        } else {
            self.push_line(&format!("{}: Calibration values stored", component));
            self.push_line(&format!("CALIBRATION_COMPLETE:{}", component));
        }
    }
}

/// Shared handle to one emulated controller board
#[derive(Debug, Clone, Default)]
pub struct VirtualDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl VirtualDevice {
    /// Board with default behaviour
    pub fn new() -> Self {
        Self::default()
    }

    /// Board with the given behaviour
    pub fn with_behavior(behavior: VirtualBehavior) -> Self {
        let device = Self::default();
        device.state.lock().behavior = behavior;
        device
    }

    /// Change behaviour at runtime
    pub fn set_behavior(&self, behavior: VirtualBehavior) {
        self.state.lock().behavior = behavior;
    }

    /// Make every later read and write fail, as if the cable was pulled
    pub fn break_link(&self) {
        self.state.lock().link_broken = true;
    }

    /// Emit an unsolicited line
    pub fn inject_line(&self, line: &str) {
        self.state.lock().push_line(line);
    }

    /// Every command line the board has received
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    /// Number of times the board was opened
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    fn open_port(&self, name: &str) -> VirtualPort {
        let mut state = self.state.lock();
        state.opens += 1;
        state.link_broken = false;
        state.outbound.clear();
        state.partial.clear();
        VirtualPort {
            name: name.to_string(),
            device: self.clone(),
        }
    }
}

/// A port connected to a [`VirtualDevice`]
pub struct VirtualPort {
    name: String,
    device: VirtualDevice,
}

impl SerialPort for VirtualPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.device.state.lock();
        if state.link_broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        state.partial.push_str(&String::from_utf8_lossy(data));
        while let Some(pos) = state.partial.find('\n') {
            let line: String = state.partial.drain(..=pos).collect();
            state.handle_line(&line);
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = self.device.state.lock();
            if state.link_broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            if !state.outbound.is_empty() {
                let n = buf.len().min(state.outbound.len());
                for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        // Mirror the short read timeout of a real port.
        std::thread::sleep(Duration::from_millis(2));
        Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
    }

    fn clear(&mut self) -> io::Result<()> {
        let mut state = self.device.state.lock();
        state.outbound.clear();
        state.partial.clear();
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens ports onto a [`VirtualDevice`]
///
/// Only the configured port names exist; opening any other name fails.
#[derive(Debug, Clone)]
pub struct VirtualPortOpener {
    device: VirtualDevice,
    ports: Vec<String>,
}

impl VirtualPortOpener {
    /// Opener exposing `device` under a single port name
    pub fn new(device: VirtualDevice, port: impl Into<String>) -> Self {
        Self {
            device,
            ports: vec![port.into()],
        }
    }

    /// Opener exposing `device` under several names
    pub fn with_ports(device: VirtualDevice, ports: Vec<String>) -> Self {
        Self { device, ports }
    }
}

impl PortOpener for VirtualPortOpener {
    fn open(
        &self,
        port: &str,
        _params: &ConnectionParams,
    ) -> Result<Box<dyn SerialPort>, ConnectionError> {
        if !self.ports.iter().any(|p| p == port) {
            return Err(ConnectionError::FailedToOpen {
                port: port.to_string(),
                reason: "no such virtual port".to_string(),
            });
        }
        Ok(Box::new(self.device.open_port(port)))
    }

    fn available_ports(&self) -> Vec<String> {
        self.ports.clone()
    }
}
