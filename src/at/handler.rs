//! AT command/response cycling over one or two command channels.
//!
//! The handler owns its channel(s) exclusively, frames received bytes into
//! lines, and classifies terminal tokens. Exchanges are strictly sequential:
//! a second `send` before the previous exchange has concluded is refused, so
//! a response can never be attributed to the wrong command.

use std::thread;
use std::time::Duration;

use memchr::memchr;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::channel::{self, ChannelError, CommandChannel};
use crate::deadline::Deadline;

use super::dialect::{Classification, Classify, Dialect};

/// Pause between empty polls of the receive channel. Keeps the loop
/// cooperative without burning a core.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Protocol-layer errors. Timeout is an expected outcome with its own
/// variant, never conflated with a transport failure.
#[derive(Debug, Error)]
pub enum AtError {
    /// The transport failed mid-exchange. Fatal to the exchange; retry
    /// policy belongs to the caller.
    #[error("transport error on {channel}: {source}")]
    Transport {
        channel: String,
        #[source]
        source: ChannelError,
    },

    /// The deadline elapsed before a complete line or terminal token arrived.
    #[error("deadline elapsed while waiting for a response")]
    Timeout,

    /// `send` was called while a previous exchange had not yet concluded.
    #[error("previous exchange has not concluded; a response could be misattributed")]
    ExchangeInProgress,
}

/// Terminal outcome of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A success token concluded the exchange.
    Success,
    /// A failure token concluded the exchange; the token line is kept for
    /// diagnostics.
    Failure(String),
    /// The deadline elapsed with no terminal token.
    TimedOut,
}

/// One complete command/response cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// The command text as sent (without delimiter).
    pub command: String,
    /// Transport echo of the command, when the device echoes.
    pub echo: Option<String>,
    /// Intermediate/unsolicited lines received before the terminal token.
    pub lines: Vec<String>,
    /// How the exchange concluded.
    pub outcome: Outcome,
}

impl Exchange {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// All captured lines joined for diagnostic text, terminal token
    /// included.
    pub fn transcript(&self) -> String {
        let mut parts: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        if let Outcome::Failure(token) = &self.outcome {
            parts.push(token);
        }
        parts.join(" | ")
    }
}

/// AT protocol handler over one unified or two split channels.
///
/// In the split configuration commands go out on the command channel and
/// responses are read from the response channel; unified uses one channel for
/// both. Either way the handler is the sole owner, so no locking is needed.
pub struct AtHandler {
    command: Box<dyn CommandChannel>,
    response: Option<Box<dyn CommandChannel>>,
    dialect: Dialect,
    /// Received but not yet classified bytes. Append-only between line
    /// extractions; the tail after a delimiter is preserved for the next call.
    buffer: Vec<u8>,
    /// True from `send` until the exchange's terminal token or timeout.
    pending: bool,
}

impl AtHandler {
    /// Unified configuration: one channel carries both directions.
    pub fn new(channel: Box<dyn CommandChannel>, dialect: Dialect) -> Self {
        Self {
            command: channel,
            response: None,
            dialect,
            buffer: Vec::new(),
            pending: false,
        }
    }

    /// Split configuration: commands on `command`, responses on `response`.
    pub fn split(
        command: Box<dyn CommandChannel>,
        response: Box<dyn CommandChannel>,
        dialect: Dialect,
    ) -> Self {
        Self {
            command,
            response: Some(response),
            dialect,
            buffer: Vec::new(),
            pending: false,
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn response_channel(&mut self) -> &mut dyn CommandChannel {
        match &mut self.response {
            Some(channel) => channel.as_mut(),
            None => self.command.as_mut(),
        }
    }

    /// Write `command_text` plus the dialect's delimiter to the command
    /// channel.
    ///
    /// Clears stale unclassified buffer content left over from the previous,
    /// already-concluded exchange. Refuses to interleave: if that exchange
    /// has not concluded, this is [`AtError::ExchangeInProgress`].
    pub fn send(&mut self, command_text: &str) -> Result<(), AtError> {
        if self.pending {
            return Err(AtError::ExchangeInProgress);
        }
        if !self.buffer.is_empty() {
            trace!(stale = self.buffer.len(), "dropping stale receive bytes");
            self.buffer.clear();
        }

        let mut frame = Vec::with_capacity(command_text.len() + self.dialect.delimiter().len());
        frame.extend_from_slice(command_text.as_bytes());
        frame.extend_from_slice(self.dialect.delimiter());

        let name = self.command.name().to_string();
        channel::write_all(self.command.as_mut(), &frame)
            .map_err(|e| transport_err(&name, e))?;
        debug!(channel = %name, command = command_text, "sent");
        self.pending = true;
        Ok(())
    }

    /// Cooperatively wait for one complete line from the response channel.
    ///
    /// Bytes may arrive in fragments; they accumulate until a delimiter is
    /// seen, and anything after the delimiter stays buffered for the next
    /// call. The deadline is re-checked at every poll boundary, so both
    /// natural elapse and cancellation end the wait promptly (cancellation
    /// surfaces as [`AtError::Timeout`] on the already-abandoned exchange).
    pub fn read_line(&mut self, deadline: &Deadline) -> Result<String, AtError> {
        let name = match &self.response {
            Some(channel) => channel.name().to_string(),
            None => self.command.name().to_string(),
        };
        loop {
            if let Some(line) = self.extract_line() {
                trace!(line = %line, "line");
                return Ok(line);
            }
            // `remaining() == None` covers both cancellation and an unarmed
            // deadline; the loop must never spin indefinitely.
            if deadline.has_elapsed() || deadline.remaining().is_none() {
                return Err(AtError::Timeout);
            }

            let mut chunk = [0u8; 64];
            let read = self.response_channel().read_bytes(&mut chunk);
            let n = read.map_err(|e| transport_err(&name, e))?;
            if n == 0 {
                thread::sleep(POLL_INTERVAL);
            } else {
                self.buffer.extend_from_slice(&chunk[..n]);
            }
        }
    }

    /// Extract the first complete line from the buffer, consuming it and its
    /// delimiter. Partial trailing data is never lost.
    fn extract_line(&mut self) -> Option<String> {
        let delimiter = self.dialect.delimiter();
        let first = *delimiter.first()?;
        let mut search_from = 0;
        while let Some(pos) = memchr(first, &self.buffer[search_from..]) {
            let at = search_from + pos;
            let end = at + delimiter.len();
            if end > self.buffer.len() {
                // Delimiter may be split across fragments; wait for more.
                return None;
            }
            if &self.buffer[at..end] == delimiter {
                let line = String::from_utf8_lossy(&self.buffer[..at]).into_owned();
                self.buffer.drain(..end);
                return Some(line);
            }
            search_from = at + 1;
        }
        None
    }

    /// Wait for the exchange's terminal token, yielding intermediate lines
    /// lazily as they arrive.
    ///
    /// The returned iterator is finite and not restartable: it ends at the
    /// terminal classification, the deadline's elapse, or a transport error,
    /// and [`TerminalWait::outcome`] then reports how the exchange concluded.
    /// Intermediate lines are yielded to the caller, never dropped silently.
    pub fn await_terminal<'a, C: Classify>(
        &'a mut self,
        deadline: &'a Deadline,
        classifier: &'a C,
    ) -> TerminalWait<'a, C> {
        TerminalWait {
            handler: self,
            deadline,
            classifier,
            outcome: None,
            done: false,
        }
    }

    /// Compose [`send`](Self::send) and [`await_terminal`](Self::await_terminal)
    /// with the handler's own dialect into one exchange.
    ///
    /// The first intermediate line equal to the command text is recorded as
    /// the transport echo rather than as data. A timeout is a normal outcome
    /// ([`Outcome::TimedOut`]); only transport failures surface as `Err`.
    pub fn execute(
        &mut self,
        command_text: &str,
        deadline: &Deadline,
    ) -> Result<Exchange, AtError> {
        self.send(command_text)?;

        let dialect = self.dialect.clone();
        let mut echo = None;
        let mut lines = Vec::new();
        let mut wait = self.await_terminal(deadline, &dialect);
        for line in wait.by_ref() {
            let line = line?;
            if echo.is_none() && lines.is_empty() && line == command_text {
                echo = Some(line);
            } else {
                lines.push(line);
            }
        }
        // The iterator only ends with an outcome recorded; a transport error
        // has already returned above.
        let outcome = wait.outcome().cloned().ok_or(AtError::Timeout)?;

        if let Outcome::Failure(token) = &outcome {
            warn!(command = command_text, token = %token, "command failed");
        }
        Ok(Exchange {
            command: command_text.to_string(),
            echo,
            lines,
            outcome,
        })
    }
}

impl std::fmt::Debug for AtHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtHandler")
            .field("command", &self.command.name())
            .field("response", &self.response.as_ref().map(|c| c.name().to_string()))
            .field("buffered", &self.buffer.len())
            .field("pending", &self.pending)
            .finish()
    }
}

fn transport_err(channel: &str, source: ChannelError) -> AtError {
    AtError::Transport {
        channel: channel.to_string(),
        source,
    }
}

/// Lazy, finite iterator over the intermediate lines of one exchange.
/// Produced by [`AtHandler::await_terminal`].
pub struct TerminalWait<'a, C: Classify> {
    handler: &'a mut AtHandler,
    deadline: &'a Deadline,
    classifier: &'a C,
    outcome: Option<Outcome>,
    done: bool,
}

impl<C: Classify> TerminalWait<'_, C> {
    /// How the exchange concluded, once the iterator has ended. `None` while
    /// lines are still pending or after a transport error.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    fn conclude(&mut self, outcome: Outcome) {
        self.done = true;
        self.handler.pending = false;
        self.outcome = Some(outcome);
    }
}

impl<C: Classify> Iterator for TerminalWait<'_, C> {
    type Item = Result<String, AtError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.handler.read_line(self.deadline) {
            Ok(line) => match self.classifier.classify(&line) {
                Classification::Success => {
                    self.conclude(Outcome::Success);
                    None
                }
                Classification::Failure => {
                    self.conclude(Outcome::Failure(line));
                    None
                }
                Classification::Intermediate => Some(Ok(line)),
            },
            Err(AtError::Timeout) => {
                self.conclude(Outcome::TimedOut);
                None
            }
            Err(e) => {
                // Fatal to the exchange; the handler may start a fresh one.
                self.done = true;
                self.handler.pending = false;
                Some(Err(e))
            }
        }
    }
}
