//! Serial port byte source

use crate::sources::{not_open, read_one, ByteSource};
use crate::types::{DecoderError, Result};
use serialport::SerialPort;
use std::time::Duration;

/// Default serial device
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyUSB0";

/// Default data rate of the controller bus
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Reads bytes from a serial TTY
pub struct SerialSource {
    device: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialSource {
    pub fn new(device: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device: device.into(),
            baud_rate,
            timeout: Duration::from_secs(5),
            port: None,
        }
    }

    /// Builder method: read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl std::fmt::Debug for SerialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSource")
            .field("device", &self.device)
            .field("baud_rate", &self.baud_rate)
            .field("timeout", &self.timeout)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl ByteSource for SerialSource {
    fn open(&mut self) -> Result<()> {
        log::info!("Opening serial port {} at {} baud", self.device, self.baud_rate);
        let port = serialport::new(&self.device, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| DecoderError::Io(e.into()))?;
        self.port = Some(port);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let port = self.port.as_mut().ok_or_else(|| not_open("serial port"))?;
        read_one(port)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Closed serial port {}", self.device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device() {
        let mut source = SerialSource::new("/dev/does-not-exist-kwb", DEFAULT_BAUD_RATE)
            .with_timeout(Duration::from_millis(10));
        assert!(matches!(source.open(), Err(DecoderError::Io(_))));
        assert!(matches!(source.read_byte(), Err(DecoderError::Io(_))));
        assert_eq!(source.device(), "/dev/does-not-exist-kwb");
    }
}
