//! Serial port command channel.
//!
//! Wraps the `serialport` crate behind [`CommandChannel`]. Ports are opened
//! with a short native timeout so reads are bounded polls and the caller's
//! deadline stays responsive.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tracing::debug;

use super::error::ChannelError;
use super::{CommandChannel, POLL_SLICE};

/// A serial port channel (8N1, configurable baud rate).
pub struct SerialChannel {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialChannel {
    /// Open `path` at `baud_rate` with the default poll-slice read timeout.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, ChannelError> {
        let port = serialport::new(path, baud_rate)
            .timeout(POLL_SLICE)
            .open()
            .map_err(|e| match e.kind() {
                // Linux reports a bad path as a plain I/O NotFound, not NoDevice.
                serialport::ErrorKind::NoDevice
                | serialport::ErrorKind::Io(ErrorKind::NotFound) => ChannelError::not_found(path),
                serialport::ErrorKind::InvalidInput => ChannelError::config(e.to_string()),
                _ => ChannelError::Serial(e),
            })?;
        debug!(port = path, baud_rate, "serial channel opened");
        Ok(Self {
            port,
            name: path.to_string(),
        })
    }
}

impl CommandChannel for SerialChannel {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        self.port.write(data).map_err(ChannelError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, ChannelError> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            // A poll slice with no data is not a failure.
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(ChannelError::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), ChannelError> {
        self.port.set_timeout(timeout).map_err(ChannelError::Serial)
    }

    fn clear_input(&mut self) -> Result<(), ChannelError> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(ChannelError::Serial)
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_port_is_not_found() {
        let result = SerialChannel::open("/dev/nonexistent_port_12345", 115_200);
        assert!(matches!(result, Err(ChannelError::NotFound(name)) if name.contains("nonexistent")));
    }
}
