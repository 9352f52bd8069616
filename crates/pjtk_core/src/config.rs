//! Layered application configuration.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. An optional TOML file (`pjtk.toml` in the working directory unless a
//!    path is given)
//! 3. `PJTK_*` environment variables, e.g. `PJTK_DATABASE_PATH`
//!
//! # Invariants
//! - `log_level` is one of trace|debug|info|warn|error after loading.
//! - `bind_addr` is a non-empty `host:port`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "pjtk.toml";
pub const ENV_PREFIX: &str = "PJTK_";

#[derive(Debug)]
pub enum ConfigError {
    Figment(Box<figment::Error>),
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Figment(err) => write!(f, "configuration error: {err}"),
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid configuration value for `{field}`: {reason}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Figment(err) => Some(err.as_ref()),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    pub log_dir: PathBuf,
    /// Root under which uploaded report and file paths are resolved.
    pub media_root: PathBuf,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("pjtk.sqlite3"),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: PathBuf::from("logs"),
            media_root: PathBuf::from("media"),
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads defaults, then `pjtk.toml` when present, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`] with an explicit TOML file. An explicit file
    /// that does not exist is skipped the same way the default one is.
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(file).extract()?;
        config.validated()
    }

    pub fn figment(file: Option<&Path>) -> Figment {
        let path = file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        let level = self.log_level.trim().to_ascii_lowercase();
        self.log_level = match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => level,
            "warning" => "warn".to_string(),
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "log_level",
                    reason: format!("unsupported level `{}`", self.log_level),
                })
            }
        };

        let bind = self.bind_addr.trim();
        if bind.is_empty() || !bind.contains(':') {
            return Err(ConfigError::InvalidValue {
                field: "bind_addr",
                reason: format!("expected host:port, got `{}`", self.bind_addr),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_load_without_files_or_env() {
        Jail::expect_with(|_jail| {
            let config = AppConfig::load().expect("defaults load");
            assert_eq!(config.database_path, PathBuf::from("pjtk.sqlite3"));
            assert_eq!(config.bind_addr, "127.0.0.1:8080");
            Ok(())
        });
    }

    #[test]
    fn toml_file_is_overridden_by_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pjtk.toml",
                r#"
                database_path = "/srv/pjtk/db.sqlite3"
                log_level = "WARNING"
                bind_addr = "0.0.0.0:9000"
                "#,
            )?;
            jail.set_env("PJTK_BIND_ADDR", "127.0.0.1:9100");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.database_path, PathBuf::from("/srv/pjtk/db.sqlite3"));
            assert_eq!(config.log_level, "warn");
            assert_eq!(config.bind_addr, "127.0.0.1:9100");
            Ok(())
        });
    }

    #[test]
    fn bad_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("PJTK_LOG_LEVEL", "chatty");
            let err = AppConfig::load().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue {
                    field: "log_level",
                    ..
                }
            ));

            jail.set_env("PJTK_LOG_LEVEL", "info");
            jail.set_env("PJTK_BIND_ADDR", "localhost");
            let err = AppConfig::load().unwrap_err();
            assert!(err.to_string().contains("bind_addr"));
            Ok(())
        });
    }
}
