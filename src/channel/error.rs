//! Channel-level error types.
//!
//! Transport failures are kept separate from protocol-level errors: a
//! [`ChannelError`] is fatal to the exchange in flight and is never retried
//! below the test step.

use thiserror::Error;

/// Errors raised by a command channel (serial port or telnet socket).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The named serial port does not exist on this system.
    #[error("serial port not found: {0}")]
    NotFound(String),

    /// An I/O error during a read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad channel parameters (baud rate, address, ...).
    #[error("channel configuration error: {0}")]
    Config(String),

    /// The peer closed the connection.
    #[error("channel closed by peer")]
    Closed,

    /// A serialport-specific error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl ChannelError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = ChannelError::not_found("/dev/ttyUSB7");
        assert_eq!(err.to_string(), "serial port not found: /dev/ttyUSB7");

        let err = ChannelError::config("baud rate 0 is not valid");
        assert!(err.to_string().contains("baud rate 0"));

        assert_eq!(ChannelError::Closed.to_string(), "channel closed by peer");
    }
}
