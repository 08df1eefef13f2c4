//! Command channel abstraction.
//!
//! A [`CommandChannel`] is a bidirectional byte channel exclusively owned by
//! whoever drives it — one AT handler or one console per channel, enforced by
//! ownership rather than locking. Implementations exist for real serial ports,
//! telnet consoles, and a scripted mock for tests.

pub mod error;
pub mod mock;
pub mod serial;
pub mod telnet;

pub use error::ChannelError;
pub use mock::MockChannel;
pub use serial::SerialChannel;
pub use telnet::TelnetChannel;

use std::time::Duration;

/// How long a single `read_bytes` call may block waiting for data.
///
/// Short enough that the caller's deadline is re-checked promptly; the
/// original harness opened its ports with a 10 ms native timeout for the same
/// reason.
pub const POLL_SLICE: Duration = Duration::from_millis(10);

/// Byte-oriented channel to a device under test.
///
/// Reads are bounded polls: a call returns `Ok(0)` when nothing arrived
/// within the channel's read timeout, so the caller can re-check its deadline
/// between polls instead of blocking indefinitely.
pub trait CommandChannel: Send + std::fmt::Debug {
    /// Write bytes to the channel. Returns the number of bytes written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, ChannelError>;

    /// Read available bytes into `buffer`.
    ///
    /// Returns `Ok(0)` when no data arrived within the poll slice; a genuine
    /// transport failure is an `Err`.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, ChannelError>;

    /// Human-readable channel name (port path or socket address).
    fn name(&self) -> &str;

    /// Bound the blocking time of a single `read_bytes` call.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), ChannelError>;

    /// Discard any unread input pending on the transport.
    fn clear_input(&mut self) -> Result<(), ChannelError>;
}

impl CommandChannel for Box<dyn CommandChannel> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        (**self).write_bytes(data)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, ChannelError> {
        (**self).read_bytes(buffer)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), ChannelError> {
        (**self).set_read_timeout(timeout)
    }

    fn clear_input(&mut self) -> Result<(), ChannelError> {
        (**self).clear_input()
    }
}

/// Write all of `data`, looping over partial writes.
pub(crate) fn write_all(
    channel: &mut dyn CommandChannel,
    mut data: &[u8],
) -> Result<(), ChannelError> {
    while !data.is_empty() {
        let n = channel.write_bytes(data)?;
        if n == 0 {
            return Err(ChannelError::Closed);
        }
        data = &data[n..];
    }
    Ok(())
}
