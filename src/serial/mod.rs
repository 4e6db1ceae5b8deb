//! # Serial Communication Module
//!
//! Handles the two UART links of the tracker.
//!
//! This module handles:
//! - Opening the GPS receiver and modem ports (8N1, no flow control)
//! - Wrapping them behind [`SerialPortIO`] for non-blocking polling
//! - Handing out each channel only when its boot phase needs it

pub mod port_trait;

use crate::config::SerialConfig;
use crate::error::{GeoLinkerError, Result};
use port_trait::{SerialPortIO, TokioSerialPort};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

/// Opens the byte channels on demand
///
/// Acquisition mode only ever opens the GPS channel and upload mode only the
/// modem channel.
pub trait ChannelProvider {
    type Gps: SerialPortIO;
    type Modem: SerialPortIO;

    fn open_gps(&mut self) -> Result<Self::Gps>;

    fn open_modem(&mut self) -> Result<Self::Modem>;
}

/// Channel provider backed by real serial devices
#[derive(Debug, Clone)]
pub struct SerialChannels {
    gps: SerialConfig,
    modem: SerialConfig,
}

impl SerialChannels {
    pub fn new(gps: SerialConfig, modem: SerialConfig) -> Self {
        Self { gps, modem }
    }
}

impl ChannelProvider for SerialChannels {
    type Gps = TokioSerialPort;
    type Modem = TokioSerialPort;

    fn open_gps(&mut self) -> Result<TokioSerialPort> {
        let port = open_port(&self.gps.port, self.gps.baud_rate)?;
        info!("GPS receiver opened at {} ({} baud)", self.gps.port, self.gps.baud_rate);
        Ok(port)
    }

    fn open_modem(&mut self) -> Result<TokioSerialPort> {
        let port = open_port(&self.modem.port, self.modem.baud_rate)?;
        info!("Modem opened at {} ({} baud)", self.modem.port, self.modem.baud_rate);
        Ok(port)
    }
}

/// Open a specific serial port with 8N1 settings
///
/// Must be called from within a tokio runtime.
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyS0")
/// * `baud_rate` - Line speed
///
/// # Returns
///
/// * `Result<TokioSerialPort>` - Opened serial port
///
/// # Errors
///
/// Returns `GeoLinkerError::Serial` if the device cannot be opened
pub fn open_port(path: &str, baud_rate: u32) -> Result<TokioSerialPort> {
    debug!("Trying to open serial port: {}", path);

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| GeoLinkerError::Serial(format!("Failed to open {}: {}", path, e)))?;

    Ok(TokioSerialPort::new(port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_port_with_invalid_path_returns_error() {
        let result = open_port("/dev/nonexistent_serial_device_12345", 9600);

        match result {
            Err(GeoLinkerError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            Err(other) => panic!("Expected Serial error, got: {:?}", other),
            Ok(_) => panic!("Opening a missing device should fail"),
        }
    }

    #[tokio::test]
    async fn test_serial_channels_report_missing_devices() {
        let gps = SerialConfig {
            port: "/dev/nonexistent_gps".to_string(),
            baud_rate: 9600,
        };
        let modem = SerialConfig {
            port: "/dev/nonexistent_modem".to_string(),
            baud_rate: 9600,
        };
        let mut channels = SerialChannels::new(gps, modem);

        assert!(matches!(channels.open_gps(), Err(GeoLinkerError::Serial(_))));
        assert!(matches!(channels.open_modem(), Err(GeoLinkerError::Serial(_))));
    }
}
