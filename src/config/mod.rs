//! TOML-based configuration with environment variable overrides.
//!
//! Resolution order: `ATBENCH_CONFIG` env path, then `./atbench.toml`, then
//! the platform config directory, then built-in defaults. Any of the common
//! values can be overridden via `ATBENCH_*` environment variables (see
//! `loader`).

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader};
pub use schema::{
    BenchConfig, Config, DialectConfig, LoggingConfig, ModuleConfig, ReportConfig, SerialConfig,
};
