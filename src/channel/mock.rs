//! Scripted mock channel for tests.
//!
//! Reads are scripted as an ordered list of fragments; each `read_bytes` call
//! delivers at most one fragment, so line reassembly across arbitrary
//! fragment boundaries is exercised exactly as scripted. Handles are `Clone`
//! and share state, letting a test keep feeding or inspecting the channel it
//! handed to a handler.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ChannelError;
use super::CommandChannel;

#[derive(Debug, Default)]
struct MockState {
    fragments: VecDeque<Vec<u8>>,
    write_log: Vec<Vec<u8>>,
    fail_next_read: bool,
    fail_next_write: bool,
    input_cleared: bool,
}

/// In-memory command channel with scripted reads and a write log.
#[derive(Debug, Clone)]
pub struct MockChannel {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Script one read fragment. Consecutive calls script consecutive reads.
    pub fn push_read(&self, fragment: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.fragments.push_back(fragment.to_vec());
    }

    /// Script a full device response line, delimiter included.
    pub fn push_line(&self, line: &str) {
        self.push_read(format!("{line}\r\n").as_bytes());
    }

    /// Make the next read fail with an I/O error.
    pub fn fail_next_read(&self) {
        self.state.lock().unwrap().fail_next_read = true;
    }

    /// Make the next write fail with an I/O error.
    pub fn fail_next_write(&self) {
        self.state.lock().unwrap().fail_next_write = true;
    }

    /// Everything written to the channel so far, one entry per write call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().write_log.clone()
    }

    /// All written bytes, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().write_log.concat()
    }

    /// Whether `clear_input` has been called since construction.
    pub fn input_was_cleared(&self) -> bool {
        self.state.lock().unwrap().input_cleared
    }

    /// Number of scripted fragments not yet consumed.
    pub fn pending_fragments(&self) -> usize {
        self.state.lock().unwrap().fragments.len()
    }
}

impl CommandChannel for MockChannel {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, ChannelError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_read {
            state.fail_next_read = false;
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted read failure",
            )));
        }
        let Some(mut fragment) = state.fragments.pop_front() else {
            // Scripted silence: nothing arrived within this poll slice.
            return Ok(0);
        };
        let n = fragment.len().min(buffer.len());
        buffer[..n].copy_from_slice(&fragment[..n]);
        if n < fragment.len() {
            fragment.drain(..n);
            state.fragments.push_front(fragment);
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), ChannelError> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap();
        state.fragments.clear();
        state.input_cleared = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fragments_are_delivered_one_per_read() {
        let mut channel = MockChannel::new("MOCK0");
        channel.push_read(b"AT+TEST\r\nO");
        channel.push_read(b"K\r\n");

        let mut buf = [0u8; 64];
        let n = channel.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"AT+TEST\r\nO");
        let n = channel.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"K\r\n");
        assert_eq!(channel.read_bytes(&mut buf).unwrap(), 0);
    }

    #[test]
    fn oversized_fragment_is_split_over_reads() {
        let mut channel = MockChannel::new("MOCK0");
        channel.push_read(b"0123456789");

        let mut buf = [0u8; 4];
        assert_eq!(channel.read_bytes(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(channel.read_bytes(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"4567");
        assert_eq!(channel.read_bytes(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
    }

    #[test]
    fn write_log_records_every_write() {
        let mut channel = MockChannel::new("MOCK0");
        channel.write_bytes(b"AT\r\n").unwrap();
        channel.write_bytes(b"ATI\r\n").unwrap();
        assert_eq!(channel.write_log().len(), 2);
        assert_eq!(channel.written(), b"AT\r\nATI\r\n");
    }

    #[test]
    fn scripted_failures_fire_once() {
        let mut channel = MockChannel::new("MOCK0");
        channel.fail_next_read();
        let mut buf = [0u8; 8];
        assert!(channel.read_bytes(&mut buf).is_err());
        assert_eq!(channel.read_bytes(&mut buf).unwrap(), 0);

        channel.fail_next_write();
        assert!(channel.write_bytes(b"AT").is_err());
        assert!(channel.write_bytes(b"AT").is_ok());
    }

    #[test]
    fn clear_input_drops_pending_fragments() {
        let mut channel = MockChannel::new("MOCK0");
        channel.push_line("stale");
        channel.clear_input().unwrap();
        assert!(channel.input_was_cleared());
        assert_eq!(channel.pending_fragments(), 0);
    }
}
