//! Configuration schema.
//!
//! All sections are defined with serde and carry usable defaults, so a bench
//! runs without any config file at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default serial parameters.
    pub serial: SerialConfig,
    /// AT dialect: terminal tokens and line delimiter.
    pub dialect: DialectConfig,
    /// Bench layout: module dependency graph, log directory.
    pub bench: BenchConfig,
    /// Report artifact locations.
    pub report: ReportConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Serial port defaults used when a test script does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Default baud rate for command channels.
    pub default_baud: u32,
    /// Default per-exchange deadline in milliseconds.
    pub default_deadline_ms: u64,
    /// Port aliases, e.g. `modem = "/dev/ttyUSB0"`.
    pub port_aliases: BTreeMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: 115_200,
            default_deadline_ms: 2_000,
            port_aliases: BTreeMap::new(),
        }
    }
}

impl SerialConfig {
    /// Default per-exchange deadline as a `Duration`.
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }

    /// Resolve a port name through the alias table.
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Terminal token vocabulary. AT dialects vary by device, so nothing here is
/// hardcoded elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectConfig {
    /// Lines that conclude an exchange successfully.
    pub success_tokens: Vec<String>,
    /// Lines that conclude an exchange as failed (exact match).
    pub failure_tokens: Vec<String>,
    /// Line prefixes that conclude an exchange as failed.
    pub failure_prefixes: Vec<String>,
    /// Additional regex patterns treated as failure terminals.
    pub failure_patterns: Vec<String>,
    /// Line delimiter on the wire.
    pub delimiter: String,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            success_tokens: vec!["OK".into()],
            failure_tokens: vec!["ERROR".into()],
            failure_prefixes: vec!["+CME ERROR:".into(), "+CMS ERROR:".into()],
            failure_patterns: Vec::new(),
            delimiter: "\r\n".into(),
        }
    }
}

/// One hardware module of the device under test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// Modules this one depends on; they are locked first. The graph must be
    /// acyclic.
    pub depends: Vec<String>,
}

/// Bench layout section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Directory for per-run session logs; recreated on bench start.
    pub log_dir: PathBuf,
    /// Hardware module dependency graph.
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            modules: BTreeMap::new(),
        }
    }
}

/// Report artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// CSV summary path.
    pub csv_path: PathBuf,
    /// LaTeX header file providing the document preamble, if LaTeX output is
    /// wanted.
    pub latex_header: Option<PathBuf>,
    /// Rendered LaTeX output path.
    pub latex_path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("results.csv"),
            latex_header: None,
            latex_path: PathBuf::from("report.tex"),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional file to also write logs to, at debug level.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}
