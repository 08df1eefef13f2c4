//! Configuration loading with file resolution and environment overrides.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;

/// Config file name looked up in the current and XDG config directories.
const CONFIG_FILE_NAME: &str = "atbench.toml";

/// Environment variable naming an explicit config path.
const CONFIG_PATH_ENV: &str = "ATBENCH_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path, if one was found.
    pub config_path: Option<PathBuf>,
    /// The loaded configuration.
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using the standard resolution order:
    ///
    /// 1. `ATBENCH_CONFIG` environment variable (explicit path)
    /// 2. `./atbench.toml`
    /// 3. platform config dir (e.g. `~/.config/atbench/atbench.toml`)
    /// 4. built-in defaults
    ///
    /// Environment overrides are applied on top in every case.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();
        let mut config = match &config_path {
            Some(path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;
        debug!(path = ?config_path, "configuration loaded");
        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from an explicit file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Defaults plus environment overrides, no file.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        let _ = apply_env_overrides(&mut config);
        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Write the current configuration to `path` as TOML.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let text = toml::to_string_pretty(&self.config)?;
        std::fs::write(path.as_ref(), text).map_err(|source| ConfigError::WriteError {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// Resolve the configuration file path using the standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    if let Some(dirs) = ProjectDirs::from("", "", "atbench") {
        let app_config = dirs.config_dir().join(CONFIG_FILE_NAME);
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

/// Apply `ATBENCH_*` environment overrides onto a loaded config.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(value) = std::env::var("ATBENCH_SERIAL_BAUD") {
        config.serial.default_baud = value
            .parse()
            .map_err(|_| ConfigError::env_parse("ATBENCH_SERIAL_BAUD", "expected an integer"))?;
    }
    if let Ok(value) = std::env::var("ATBENCH_DEADLINE_MS") {
        config.serial.default_deadline_ms = value
            .parse()
            .map_err(|_| ConfigError::env_parse("ATBENCH_DEADLINE_MS", "expected an integer"))?;
    }
    if let Ok(value) = std::env::var("ATBENCH_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = std::env::var("ATBENCH_LOG_DIR") {
        config.bench.log_dir = PathBuf::from(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [serial]
            default_baud = 57600

            [dialect]
            success_tokens = ["OK", "DONE"]
            "#
        )
        .unwrap();

        let loader = ConfigLoader::load_from(file.path()).unwrap();
        assert_eq!(loader.config().serial.default_baud, 57600);
        assert_eq!(
            loader.config().dialect.success_tokens,
            vec!["OK".to_string(), "DONE".to_string()]
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let result = ConfigLoader::load_from("/nonexistent/atbench.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "serial = not toml at all").unwrap();
        let result = ConfigLoader::load_from(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atbench.toml");
        let loader = ConfigLoader::with_defaults();
        loader.save_to(&path).unwrap();

        let back = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(
            back.config().serial.default_baud,
            loader.config().serial.default_baud
        );
    }
}
