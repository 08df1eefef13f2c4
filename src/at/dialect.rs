//! Terminal-token classification for AT dialects.
//!
//! AT vocabularies vary by device, so the token sets are configuration, not
//! constants: `OK`/`ERROR` by default, extended with prefixes such as
//! `+CME ERROR:` and arbitrary regex patterns. Anything a [`Classify`]
//! implementation does not recognize as terminal is an intermediate line and
//! never concludes an exchange.

use regex::Regex;

use crate::config::{ConfigError, DialectConfig};

/// How a single received line relates to the exchange in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Terminal token: the command succeeded.
    Success,
    /// Terminal token: the command failed.
    Failure,
    /// Unsolicited or informational line; the exchange continues.
    Intermediate,
}

/// Pluggable line classifier. [`Dialect`] covers the common AT vocabularies;
/// test authors can supply their own implementation for exotic devices.
pub trait Classify {
    fn classify(&self, line: &str) -> Classification;
}

/// A configurable AT dialect: terminal token vocabulary plus the
/// line-delimiter convention used for framing.
#[derive(Debug, Clone)]
pub struct Dialect {
    success_tokens: Vec<String>,
    failure_tokens: Vec<String>,
    failure_prefixes: Vec<String>,
    failure_patterns: Vec<Regex>,
    delimiter: Vec<u8>,
}

impl Default for Dialect {
    /// The conventional modem vocabulary: `OK`, `ERROR`, `+CME ERROR:<code>`,
    /// `+CMS ERROR:<code>`, CRLF delimiter.
    fn default() -> Self {
        Self {
            success_tokens: vec!["OK".into()],
            failure_tokens: vec!["ERROR".into()],
            failure_prefixes: vec!["+CME ERROR:".into(), "+CMS ERROR:".into()],
            failure_patterns: Vec::new(),
            delimiter: b"\r\n".to_vec(),
        }
    }
}

impl Dialect {
    /// Build a dialect from its configuration section, compiling the regex
    /// failure patterns.
    pub fn from_config(config: &DialectConfig) -> Result<Self, ConfigError> {
        let mut failure_patterns = Vec::with_capacity(config.failure_patterns.len());
        for pattern in &config.failure_patterns {
            let regex = Regex::new(pattern).map_err(|e| {
                ConfigError::validation("dialect.failure_patterns", e.to_string())
            })?;
            failure_patterns.push(regex);
        }
        if config.delimiter.is_empty() {
            return Err(ConfigError::validation(
                "dialect.delimiter",
                "line delimiter must not be empty",
            ));
        }
        Ok(Self {
            success_tokens: config.success_tokens.clone(),
            failure_tokens: config.failure_tokens.clone(),
            failure_prefixes: config.failure_prefixes.clone(),
            failure_patterns,
            delimiter: config.delimiter.as_bytes().to_vec(),
        })
    }

    /// Replace the success token set.
    pub fn success_tokens(mut self, tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.success_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the failure token set.
    pub fn failure_tokens(mut self, tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.failure_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Add a regex that marks matching lines as failure terminals.
    pub fn with_failure_pattern(mut self, pattern: Regex) -> Self {
        self.failure_patterns.push(pattern);
        self
    }

    /// Use a different line delimiter (e.g. `b"\n"` or `b";"`).
    pub fn with_delimiter(mut self, delimiter: &[u8]) -> Self {
        self.delimiter = delimiter.to_vec();
        self
    }

    /// The line delimiter this dialect frames with.
    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }
}

impl Classify for Dialect {
    fn classify(&self, line: &str) -> Classification {
        let trimmed = line.trim();
        if self.success_tokens.iter().any(|t| t == trimmed) {
            return Classification::Success;
        }
        if self.failure_tokens.iter().any(|t| t == trimmed)
            || self.failure_prefixes.iter().any(|p| trimmed.starts_with(p.as_str()))
            || self.failure_patterns.iter().any(|re| re.is_match(trimmed))
        {
            return Classification::Failure;
        }
        Classification::Intermediate
    }
}
