//! Serial port handling
//!
//! Discovery and configuration of the host end of the player link, usually
//! a USB-serial adapter. The player side is fixed: 9600 baud, 8N1, no flow
//! control.

use serialport::{SerialPort, SerialPortType};
use std::time::Duration;

use crate::error::ProtocolError;

/// The MY1690 speaks a fixed 9600 baud, 8N1.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// An enumerated serial port the player may be attached to.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// Product string of the USB adapter, when the OS reports one
    pub product: Option<String>,
}

/// Ordering rank for a port name.
///
/// USB CDC devices (ttyACM) come first since most MY1690 breakout boards
/// enumerate that way, then USB-serial bridges (ttyUSB) sorted by numeric
/// suffix, then everything else by name.
fn port_rank(name: &str) -> (u8, u32) {
    let base = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyACM"), (1, "ttyUSB")] {
        if let Some(suffix) = base.strip_prefix(prefix) {
            return (rank, suffix.parse().unwrap_or(u32::MAX));
        }
    }
    (2, 0)
}

/// List serial ports the player could be attached to, most likely first.
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| PortInfo {
            product: match info.port_type {
                SerialPortType::UsbPort(usb) => usb.product,
                _ => None,
            },
            name: info.port_name,
        })
        .collect();

    // Some container setups hide ports from the enumeration API even though
    // the device nodes exist.
    #[cfg(target_os = "linux")]
    if let Ok(entries) = std::fs::read_dir("/dev") {
        for entry in entries.flatten() {
            let fname = entry.file_name();
            let Some(fname) = fname.to_str() else { continue };
            if !fname.starts_with("ttyACM") && !fname.starts_with("ttyUSB") {
                continue;
            }
            let full = format!("/dev/{fname}");
            if !ports.iter().any(|p| p.name == full) {
                ports.push(PortInfo {
                    name: full,
                    product: None,
                });
            }
        }
    }

    ports.sort_by(|a, b| {
        port_rank(&a.name)
            .cmp(&port_rank(&b.name))
            .then_with(|| a.name.cmp(&b.name))
    });
    ports
}

/// Open a serial port for the player.
///
/// The short port timeout only bounds individual read calls; response
/// timing is handled by the engine's own polling.
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    serialport::new(name, baud)
        .timeout(Duration::from_millis(100))
        .open()
        .map_err(|e| ProtocolError::SerialError(e.to_string()))
}

/// Configure a serial port for player communication (8N1, no flow control)
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    Ok(())
}
