//! AT protocol layer: line framing, terminal-token classification, and
//! strictly sequential command/response exchanges.

pub mod dialect;
pub mod handler;

pub use dialect::{Classification, Classify, Dialect};
pub use handler::{AtError, AtHandler, Exchange, Outcome, TerminalWait};
