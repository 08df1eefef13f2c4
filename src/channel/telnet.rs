//! Telnet command channel.
//!
//! A plain TCP stream with the telnet IAC negotiation sequences stripped from
//! the read path. Negotiation requests are dropped, not answered: the device
//! consoles this harness drives settle their options at connect time.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::error::ChannelError;
use super::{CommandChannel, POLL_SLICE};

const IAC: u8 = 255;
const SB: u8 = 250;
const SE: u8 = 240;
const WILL: u8 = 251;
const DONT: u8 = 254;

/// Parser state for IAC stripping, carried across reads so sequences split
/// over fragment boundaries are still recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum IacState {
    #[default]
    Data,
    /// Saw IAC, waiting for the command byte.
    Command,
    /// Saw IAC WILL/WONT/DO/DONT, waiting for the option byte.
    Option,
    /// Inside an IAC SB ... IAC SE subnegotiation.
    Subnegotiation,
    /// Saw IAC inside a subnegotiation.
    SubnegotiationCommand,
}

/// Remove telnet IAC sequences from `input`, appending payload bytes to `out`.
fn strip_iac(state: &mut IacState, input: &[u8], out: &mut Vec<u8>) {
    for &byte in input {
        *state = match *state {
            IacState::Data => {
                if byte == IAC {
                    IacState::Command
                } else {
                    out.push(byte);
                    IacState::Data
                }
            }
            IacState::Command => match byte {
                // Escaped 0xFF data byte.
                IAC => {
                    out.push(IAC);
                    IacState::Data
                }
                SB => IacState::Subnegotiation,
                WILL..=DONT => IacState::Option,
                _ => IacState::Data,
            },
            IacState::Option => IacState::Data,
            IacState::Subnegotiation => {
                if byte == IAC {
                    IacState::SubnegotiationCommand
                } else {
                    IacState::Subnegotiation
                }
            }
            IacState::SubnegotiationCommand => {
                if byte == SE {
                    IacState::Data
                } else {
                    IacState::Subnegotiation
                }
            }
        };
    }
}

/// A telnet console channel over TCP.
pub struct TelnetChannel {
    stream: TcpStream,
    name: String,
    iac_state: IacState,
}

impl TelnetChannel {
    /// Connect to `addr` (e.g. `"192.168.1.10:23"`).
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self, ChannelError> {
        let name = addr.to_string();
        let stream = TcpStream::connect(&addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(POLL_SLICE))?;
        debug!(peer = %name, "telnet channel connected");
        Ok(Self {
            stream,
            name,
            iac_state: IacState::default(),
        })
    }
}

impl CommandChannel for TelnetChannel {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        self.stream.write(data).map_err(ChannelError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, ChannelError> {
        let mut raw = vec![0u8; buffer.len()];
        let n = match self.stream.read(&mut raw) {
            Ok(0) => return Err(ChannelError::Closed),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                return Ok(0)
            }
            Err(e) => return Err(ChannelError::Io(e)),
        };

        let mut payload = Vec::with_capacity(n);
        strip_iac(&mut self.iac_state, &raw[..n], &mut payload);
        buffer[..payload.len()].copy_from_slice(&payload);
        Ok(payload.len())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), ChannelError> {
        self.stream.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), ChannelError> {
        // Drain whatever is pending without blocking past one poll slice.
        let mut sink = [0u8; 256];
        loop {
            match self.stream.read(&mut sink) {
                Ok(0) => return Err(ChannelError::Closed),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    return Ok(())
                }
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
    }
}

impl std::fmt::Debug for TelnetChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnetChannel")
            .field("name", &self.name)
            .field("iac_state", &self.iac_state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripped(input: &[u8]) -> Vec<u8> {
        let mut state = IacState::default();
        let mut out = Vec::new();
        strip_iac(&mut state, input, &mut out);
        out
    }

    #[test]
    fn plain_data_passes_through() {
        assert_eq!(stripped(b"login: "), b"login: ");
    }

    #[test]
    fn negotiation_triplets_are_dropped() {
        // IAC WILL ECHO, IAC DO SUPPRESS-GO-AHEAD, then payload.
        let input = [255, 251, 1, 255, 253, 3, b'o', b'k'];
        assert_eq!(stripped(&input), b"ok");
    }

    #[test]
    fn escaped_iac_byte_is_preserved() {
        let input = [1, 255, 255, 2];
        assert_eq!(stripped(&input), &[1, 255, 2]);
    }

    #[test]
    fn subnegotiation_is_dropped() {
        // IAC SB TERMINAL-TYPE ... IAC SE wrapped around payload.
        let input = [b'a', 255, 250, 24, 1, 0, 255, 240, b'b'];
        assert_eq!(stripped(&input), b"ab");
    }

    #[test]
    fn sequence_split_across_reads_is_recognized() {
        let mut state = IacState::default();
        let mut out = Vec::new();
        strip_iac(&mut state, &[b'x', 255], &mut out);
        strip_iac(&mut state, &[251], &mut out);
        strip_iac(&mut state, &[1, b'y'], &mut out);
        assert_eq!(out, b"xy");
    }
}
