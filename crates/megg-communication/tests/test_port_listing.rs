//! Port discovery against the host system

use megg_communication::communication::serial::list_ports;
use megg_communication::{ConnectionParams, PortOpener, SystemPortOpener};

#[test]
fn test_listed_ports_are_usb_serial() {
    // Enumeration may legitimately fail in containers without udev
    if let Ok(ports) = list_ports() {
        for port in ports {
            let name = port.port_name.as_str();
            assert!(
                name.starts_with("COM")
                    || name.starts_with("/dev/tty")
                    || name.starts_with("/dev/serial/")
                    || name.starts_with("/dev/cu."),
                "unexpected port {}",
                name
            );
        }
    }
}

#[test]
fn test_opening_missing_port_fails() {
    let opener = SystemPortOpener;
    let result = opener.open("/dev/ttyMEGG-does-not-exist", &ConnectionParams::default());
    assert!(result.is_err());
}
