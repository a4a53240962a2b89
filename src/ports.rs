//! Serial port discovery.

use serialport::{SerialPortInfo, SerialPortType, UsbPortInfo};

use crate::constants::{TEENSY_PIDS, TEENSY_VID};
use crate::error::Result;

/// List available serial ports
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    Ok(serialport::available_ports()?)
}

fn is_teensy(usb: &UsbPortInfo) -> bool {
    if usb.vid != TEENSY_VID {
        return false;
    }
    if TEENSY_PIDS.contains(&usb.pid) {
        return true;
    }
    // unknown PJRC product, accept it when it presents as a USB serial device
    usb.product
        .as_deref()
        .map_or(false, |p| p.to_uppercase().contains("USB SERIAL"))
}

/// Pick the first port that looks like a Teensy board.
///
/// Known product IDs win over other PJRC devices.
pub fn find_teensy_port(ports: &[SerialPortInfo]) -> Option<String> {
    let usb_ports = || {
        ports.iter().filter_map(|port| match &port.port_type {
            SerialPortType::UsbPort(usb) if is_teensy(usb) => Some((port, usb)),
            _ => None,
        })
    };

    let found = usb_ports()
        .find(|(_, usb)| TEENSY_PIDS.contains(&usb.pid))
        .or_else(|| usb_ports().next())
        .map(|(port, _)| port.port_name.clone());
    if let Some(name) = &found {
        log::debug!("Found Teensy on {}", name);
    }
    found
}
