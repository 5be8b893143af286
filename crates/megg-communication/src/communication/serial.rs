//! Serial port communication implementation
//!
//! Provides low-level serial port operations for the USB link to the rig
//! controller board.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Opening ports through a swappable [`PortOpener`]
//! - Non-blocking-style reads with a short internal timeout

use megg_core::ConnectionError;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::ConnectionParams;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List serial ports that may carry the rig controller
///
/// Filters to USB serial patterns:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*, /dev/serial/by-id/*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>, ConnectionError> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::Enumeration {
            reason: e.to_string(),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_valid_rig_port(&port.port_name))
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, get_port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb_info) => {
                    let info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                    match usb_info.manufacturer {
                        Some(ref mfg) => info.with_manufacturer(mfg),
                        None => info,
                    }
                }
                _ => info,
            }
        })
        .collect())
}

/// Check if a port name matches a USB serial pattern
fn is_valid_rig_port(port_name: &str) -> bool {
    // Windows COM ports
    if let Some(num) = port_name.strip_prefix("COM") {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    }

    // Linux USB and ACM devices, plus stable symlinks
    if port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/serial/by-id/")
    {
        return true;
    }

    // macOS serial and modem devices
    port_name.starts_with("/dev/cu.usbserial") || port_name.starts_with("/dev/cu.usbmodem")
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Low-level serial port interface
///
/// `read` returns `Ok(0)` or an error of kind `TimedOut`/`WouldBlock` when no
/// byte arrived within the port's short internal timeout.
pub trait SerialPort: Send {
    /// Write data to the port
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read data from the port
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard pending input and output
    fn clear(&mut self) -> io::Result<()>;

    /// Get the port name
    fn name(&self) -> String;

    /// Close the port
    fn close(&mut self) -> io::Result<()>;
}

/// Opens ports by name
///
/// Lets the device link run against real hardware or the virtual device.
pub trait PortOpener: Send + Sync {
    /// Open `port` with the given parameters
    fn open(
        &self,
        port: &str,
        params: &ConnectionParams,
    ) -> Result<Box<dyn SerialPort>, ConnectionError>;

    /// Ports currently visible on this system
    fn available_ports(&self) -> Vec<String>;
}

/// Real serial port implementation using serialport crate
pub struct RealSerialPort {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl RealSerialPort {
    /// Open a serial port with the given parameters
    pub fn open(port: &str, params: &ConnectionParams) -> Result<Self, ConnectionError> {
        let builder = serialport::new(port, params.baud_rate)
            .timeout(Duration::from_millis(10)) // Short timeout so reads poll
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None);

        match builder.open() {
            Ok(handle) => Ok(RealSerialPort {
                name: port.to_string(),
                port: handle,
            }),
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", port, e);
                Err(ConnectionError::FailedToOpen {
                    port: port.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl SerialPort for RealSerialPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn clear(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(io::Error::from)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        // The OS handle is released when the port is dropped.
        Ok(())
    }
}

/// Opens real serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(
        &self,
        port: &str,
        params: &ConnectionParams,
    ) -> Result<Box<dyn SerialPort>, ConnectionError> {
        Ok(Box::new(RealSerialPort::open(port, params)?))
    }

    fn available_ports(&self) -> Vec<String> {
        match list_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rig_port_patterns() {
        assert!(is_valid_rig_port("COM3"));
        assert!(is_valid_rig_port("COM10"));
        assert!(!is_valid_rig_port("COM"));
        assert!(!is_valid_rig_port("COMX"));
        assert!(is_valid_rig_port("/dev/ttyUSB0"));
        assert!(is_valid_rig_port("/dev/ttyACM1"));
        assert!(is_valid_rig_port("/dev/serial/by-id/usb-Arduino_Uno-if00"));
        assert!(is_valid_rig_port("/dev/cu.usbmodem14101"));
        assert!(!is_valid_rig_port("/dev/ttyS0"));
    }

    #[test]
    fn test_port_info_builder() {
        let info = SerialPortInfo::new("/dev/ttyACM0", "USB Arduino Uno")
            .with_manufacturer("Arduino")
            .with_usb_ids(0x2341, 0x0043);
        assert_eq!(info.vid, Some(0x2341));
        assert_eq!(info.manufacturer.as_deref(), Some("Arduino"));
    }
}
