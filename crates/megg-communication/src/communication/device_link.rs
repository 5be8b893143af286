//! Owner of the single serial connection.
//!
//! The link knows nothing about calibration or batches: it opens and probes
//! ports, writes lines, and reads lines with a timeout. Every call blocks,
//! so it is only ever driven from a blocking worker thread.

use chrono::{DateTime, Utc};
use megg_core::ConnectionError;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::serial::{PortOpener, SerialPort};
use super::ConnectionParams;

/// Lines the probe drains after its first reply
const PROBE_DRAIN_LINES: usize = 64;
/// Quiet period that ends the probe drain
const PROBE_DRAIN_QUIET: Duration = Duration::from_millis(50);

/// The serial connection and its line buffer
pub struct DeviceLink {
    params: ConnectionParams,
    opener: Arc<dyn PortOpener>,
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
    last_good: Option<String>,
    last_probe: Option<DateTime<Utc>>,
    buffer: Vec<u8>,
}

impl DeviceLink {
    /// Create a closed link
    pub fn new(params: ConnectionParams, opener: Arc<dyn PortOpener>) -> Self {
        Self {
            params,
            opener,
            port: None,
            port_name: None,
            last_good: None,
            last_probe: None,
            buffer: Vec::new(),
        }
    }

    /// Connection parameters
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Whether a port is open
    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Name of the open port
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Port of the last successful connection
    pub fn last_good_port(&self) -> Option<&str> {
        self.last_good.as_deref()
    }

    /// Time of the last successful status probe
    pub fn last_probe(&self) -> Option<DateTime<Utc>> {
        self.last_probe
    }

    /// Connect using the ordered candidate list
    ///
    /// Returns the port that answered. Does nothing if already connected.
    pub fn connect(&mut self) -> Result<String, ConnectionError> {
        let enumerated = self.opener.available_ports();
        let candidates = self
            .params
            .candidates(self.last_good.as_deref(), &enumerated);
        self.connect_to(&candidates)
    }

    /// Try each candidate in order until one answers the status probe
    pub fn connect_to(&mut self, candidates: &[String]) -> Result<String, ConnectionError> {
        if let Some(name) = &self.port_name {
            if self.port.is_some() {
                return Ok(name.clone());
            }
        }

        for candidate in candidates {
            tracing::info!("Attempting to connect to rig controller on {}...", candidate);
            match self.try_candidate(candidate) {
                Ok(()) => {
                    tracing::info!("Connected to rig controller on {}", candidate);
                    self.last_good = Some(candidate.clone());
                    return Ok(candidate.clone());
                }
                Err(e) => {
                    tracing::warn!("Failed to connect on {}: {}", candidate, e);
                    self.disconnect();
                }
            }
        }

        tracing::error!(
            "Failed to connect to rig controller on any port: {:?}",
            candidates
        );
        Err(ConnectionError::NoDeviceFound {
            tried: candidates.len(),
        })
    }

    fn try_candidate(&mut self, candidate: &str) -> Result<(), ConnectionError> {
        let port = self.opener.open(candidate, &self.params)?;
        self.port = Some(port);
        self.port_name = Some(candidate.to_string());
        self.buffer.clear();

        // Opening the port resets the board; give it time to boot.
        std::thread::sleep(self.params.settle());
        self.clear()?;
        self.write_line("STATUS")?;

        match self.read_line(self.params.probe_timeout())? {
            Some(first) => {
                tracing::debug!("Probe reply from {}: {}", candidate, first);
                self.drain_quiet()?;
                self.last_probe = Some(Utc::now());
                Ok(())
            }
            None => Err(ConnectionError::ProbeFailed {
                port: candidate.to_string(),
            }),
        }
    }

    fn drain_quiet(&mut self) -> Result<(), ConnectionError> {
        for _ in 0..PROBE_DRAIN_LINES {
            match self.read_line(PROBE_DRAIN_QUIET)? {
                Some(line) => tracing::debug!("Probe: {}", line),
                None => break,
            }
        }
        Ok(())
    }

    /// Close the port; safe to call when already closed
    pub fn disconnect(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.close() {
                tracing::debug!("Error closing {}: {}", port.name(), e);
            }
            tracing::info!("Disconnected from {}", port.name());
        }
        self.port_name = None;
        self.buffer.clear();
    }

    /// Discard buffered input, both ours and the port's
    pub fn clear(&mut self) -> Result<(), ConnectionError> {
        self.buffer.clear();
        let result = match self.port.as_mut() {
            Some(port) => port.clear(),
            None => return Err(ConnectionError::NotConnected),
        };
        result.map_err(|e| self.fail_with(ConnectionError::ConnectionLost {
            reason: e.to_string(),
        }))
    }

    /// Write raw bytes, all of them
    ///
    /// A port that stops accepting bytes part way fails the write and closes
    /// the link.
    pub fn write(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        let mut written = 0;
        while written < data.len() {
            let result = match self.port.as_mut() {
                Some(port) => port.write(&data[written..]),
                None => return Err(ConnectionError::NotConnected),
            };
            match result {
                Ok(0) => {
                    return Err(self.fail_with(ConnectionError::WriteFailed {
                        reason: format!("port accepted {} of {} bytes", written, data.len()),
                    }))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(self.fail_with(ConnectionError::WriteFailed {
                        reason: e.to_string(),
                    }))
                }
            }
        }
        Ok(())
    }

    /// Write one command line, adding the terminator
    pub fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        tracing::debug!("-> {}", line);
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write(&data)
    }

    /// Read one non-empty line, waiting at most `timeout`
    ///
    /// Returns `Ok(None)` when nothing complete arrived in time. An I/O
    /// failure closes the link.
    pub fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, ConnectionError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw[..pos]).trim().to_string();
                if !line.is_empty() {
                    tracing::debug!("<- {}", line);
                    return Ok(Some(line));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let result = match self.port.as_mut() {
                Some(port) => port.read(&mut chunk),
                None => return Err(ConnectionError::NotConnected),
            };
            match result {
                Ok(0) => std::thread::sleep(Duration::from_millis(1)),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    return Err(self.fail_with(ConnectionError::ConnectionLost {
                        reason: e.to_string(),
                    }))
                }
            }
        }
    }

    fn fail_with(&mut self, err: ConnectionError) -> ConnectionError {
        tracing::error!("Serial link failed: {}", err);
        self.disconnect();
        err
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("port", &self.port_name)
            .field("baud_rate", &self.params.baud_rate)
            .field("last_good", &self.last_good)
            .finish()
    }
}
