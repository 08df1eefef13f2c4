//! Interactive console bridge with session logging.
//!
//! Bridges a command channel (serial or telnet) to a caller-driven
//! command/response loop while mirroring the whole session to a log file.
//! This is the passthrough front-end of the bench; it shares the channel
//! abstraction with the AT layer but is driven independently.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::channel::{self, ChannelError, CommandChannel, SerialChannel, TelnetChannel};
use crate::deadline::Deadline;

/// ASCII ETX, sent on serial attach to interrupt whatever runs on the
/// console.
const ETX: u8 = 0x03;

/// Pause between empty polls while waiting for the prompt.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("session log error: {0}")]
    Log(#[from] std::io::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// A console session over an exclusively-owned channel, mirrored to a log
/// file.
pub struct Console {
    channel: Box<dyn CommandChannel>,
    log: File,
    log_path: PathBuf,
    /// Prompt suffix that marks the end of a response (e.g. `"# "`).
    prompt: String,
    /// Whether sent commands are echoed into the log (off when the remote
    /// echoes them itself).
    log_commands: bool,
}

impl Console {
    /// Wrap an already-open channel, logging the session to `log_path`.
    pub fn new(
        channel: Box<dyn CommandChannel>,
        log_path: impl AsRef<Path>,
        prompt: impl Into<String>,
    ) -> Result<Self, ConsoleError> {
        let log_path = log_path.as_ref().to_path_buf();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        Ok(Self {
            channel,
            log,
            log_path,
            prompt: prompt.into(),
            log_commands: true,
        })
    }

    /// Attach to a serial console: opens the port, interrupts the running
    /// program with ETX, and drains pending output. The port echoes typed
    /// commands itself, so they are not duplicated into the log.
    pub fn serial(
        port: &str,
        baud_rate: u32,
        log_path: impl AsRef<Path>,
        prompt: impl Into<String>,
    ) -> Result<Self, ConsoleError> {
        let channel = SerialChannel::open(port, baud_rate)?;
        let mut console = Self::new(Box::new(channel), log_path, prompt)?;
        console.log_commands = false;
        console.channel.write_bytes(&[ETX])?;
        thread::sleep(Duration::from_millis(200));
        console.channel.clear_input()?;
        Ok(console)
    }

    /// Attach to a telnet console: connects, waits for the login prompt and
    /// sends `user`.
    pub fn telnet(
        addr: &str,
        user: &str,
        log_path: impl AsRef<Path>,
        prompt: impl Into<String>,
    ) -> Result<Self, ConsoleError> {
        let channel = TelnetChannel::connect(addr)?;
        let mut console = Self::new(Box::new(channel), log_path, prompt)?;
        let (found, banner) = console.read_until("login: ", Duration::from_secs(30))?;
        console.log.write_all(banner.as_bytes())?;
        if !found {
            warn!(addr, "no login prompt seen; continuing anyway");
        }
        console.send(user, true, Duration::from_secs(10))?;
        Ok(console)
    }

    /// Send one command line. With `readback`, waits up to `budget` for the
    /// prompt to reappear and returns everything received; without it,
    /// returns immediately with an empty string. Both directions are
    /// mirrored to the session log.
    pub fn send(
        &mut self,
        command: &str,
        readback: bool,
        budget: Duration,
    ) -> Result<String, ConsoleError> {
        if self.log_commands {
            writeln!(self.log, "{}{}", self.prompt, command)?;
        }
        let frame = format!("{command}\n");
        channel::write_all(self.channel.as_mut(), frame.as_bytes())?;
        debug!(command, "console send");

        if !readback {
            return Ok(String::new());
        }
        let prompt = self.prompt.clone();
        let (found, response) = self.read_until(&prompt, budget)?;
        if !found {
            warn!(command, "prompt not seen before budget elapsed");
        }
        self.log.write_all(response.as_bytes())?;
        self.log.flush()?;
        Ok(response)
    }

    /// Accumulate channel output until `pattern` appears or `budget`
    /// elapses. Returns whether the pattern was found and everything read.
    fn read_until(
        &mut self,
        pattern: &str,
        budget: Duration,
    ) -> Result<(bool, String), ConsoleError> {
        let deadline = Deadline::started(budget);
        let mut collected = String::new();
        while !deadline.has_elapsed() {
            let mut chunk = [0u8; 256];
            let n = self.channel.read_bytes(&mut chunk)?;
            if n == 0 {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            collected.push_str(&String::from_utf8_lossy(&chunk[..n]));
            if collected.contains(pattern) {
                return Ok((true, collected));
            }
        }
        Ok((false, collected))
    }

    /// Switch the session log to a new file for the following commands.
    pub fn switch_log(&mut self, path: impl AsRef<Path>) -> Result<(), ConsoleError> {
        self.log.flush()?;
        self.log_path = path.as_ref().to_path_buf();
        self.log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        Ok(())
    }

    /// Path of the current session log.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("channel", &self.channel.name())
            .field("log_path", &self.log_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use pretty_assertions::assert_eq;

    fn console_over(channel: &MockChannel, dir: &tempfile::TempDir) -> Console {
        Console::new(
            Box::new(channel.clone()),
            dir.path().join("session.log"),
            "# ",
        )
        .unwrap()
    }

    #[test]
    fn send_without_readback_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new("MOCK0");
        let mut console = console_over(&channel, &dir);

        let response = console
            .send("reboot", false, Duration::from_secs(1))
            .unwrap();
        assert_eq!(response, "");
        assert_eq!(channel.written(), b"reboot\n".to_vec());
    }

    #[test]
    fn readback_collects_until_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new("MOCK0");
        channel.push_read(b"uptime 42 days\n");
        channel.push_read(b"# ");
        let mut console = console_over(&channel, &dir);

        let response = console.send("uptime", true, Duration::from_secs(1)).unwrap();
        assert!(response.contains("uptime 42 days"));
        assert!(response.ends_with("# "));
    }

    #[test]
    fn session_is_mirrored_to_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new("MOCK0");
        channel.push_read(b"ok\n# ");
        let mut console = console_over(&channel, &dir);
        console.send("status", true, Duration::from_secs(1)).unwrap();

        let log = std::fs::read_to_string(dir.path().join("session.log")).unwrap();
        assert!(log.contains("# status"));
        assert!(log.contains("ok"));
    }

    #[test]
    fn missing_prompt_times_out_with_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new("MOCK0");
        channel.push_read(b"partial output");
        let mut console = console_over(&channel, &dir);

        let response = console
            .send("hang", true, Duration::from_millis(50))
            .unwrap();
        assert_eq!(response, "partial output");
    }

    #[test]
    fn switch_log_rotates_the_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let channel = MockChannel::new("MOCK0");
        channel.push_read(b"a\n# ");
        channel.push_read(b"b\n# ");
        let mut console = console_over(&channel, &dir);

        console.send("first", true, Duration::from_secs(1)).unwrap();
        console.switch_log(dir.path().join("second.log")).unwrap();
        console.send("second", true, Duration::from_secs(1)).unwrap();

        let first = std::fs::read_to_string(dir.path().join("session.log")).unwrap();
        let second = std::fs::read_to_string(dir.path().join("second.log")).unwrap();
        assert!(first.contains("first"));
        assert!(!first.contains("second"));
        assert!(second.contains("second"));
    }
}
