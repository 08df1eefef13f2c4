//! atbench: a hardware-validation harness for AT-speaking devices.
//!
//! Drives device modules over serial or telnet links, exchanges AT
//! commands under explicit time budgets, and turns the results into CSV,
//! JSON and LaTeX reports.
//!
//! # Modules
//!
//! - `deadline`: one-shot time budgets with cross-thread cancellation
//! - `channel`: byte-level transports (serial, telnet, mock)
//! - `at`: AT command exchanges and response classification
//! - `step`: single test steps with verdicts and run-once semantics
//! - `report`: result aggregation plus CSV/JSON/LaTeX output
//! - `console`: interactive console bridge with session logging
//! - `bench`: module locking and parallel job execution
//! - `config`: TOML configuration with env overrides

pub mod at;
pub mod bench;
pub mod channel;
pub mod config;
pub mod console;
pub mod deadline;
pub mod report;
pub mod step;

// Re-export commonly used types for convenience
pub use at::{AtError, AtHandler, Classification, Classify, Dialect, Exchange, Outcome};
pub use bench::{ModuleGuards, Runner, TestBench};
pub use channel::{
    ChannelError, CommandChannel, MockChannel, SerialChannel, TelnetChannel, POLL_SLICE,
};
pub use config::{Config, ConfigError, ConfigLoader};
pub use console::{Console, ConsoleError};
pub use deadline::{Deadline, InvalidState};
pub use report::{ReportError, ResultHandler, StepRecord, Summary, Transcriptor};
pub use step::{StepContext, StepError, StepOutcome, TestStep, Verdict};
