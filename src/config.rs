//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the file named by `STAGEWISE_CONFIG`) and
//! deserializes into strongly-typed structs. Every section has defaults,
//! so a partial file is valid. Secrets are referenced by env-var name in
//! the config and resolved at runtime with `resolve_env`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::validation::ValidatorConfig;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "STAGEWISE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub validation: ValidatorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Currency label for all monetary inputs.
    pub currency: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "stagewise".into(),
            currency: "SAR".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// `"memory"` or a `sqlite:` connection URL.
    pub database_url: String,
    /// Env var holding a connection URL that overrides `database_url`.
    pub database_url_env: Option<String>,
    /// JSON file the in-memory store is restored from and written to on
    /// shutdown.
    pub state_file: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "memory".into(),
            database_url_env: None,
            state_file: None,
        }
    }
}

/// Which backend `StorageConfig` selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Memory { state_file: Option<String> },
    Sqlite { url: String },
}

impl StorageConfig {
    pub fn backend(&self) -> Result<StorageBackend> {
        let url = match &self.database_url_env {
            Some(env) => AppConfig::resolve_env(env)?,
            None => self.database_url.clone(),
        };
        let url = url.trim();

        if url.eq_ignore_ascii_case("memory") {
            Ok(StorageBackend::Memory {
                state_file: self.state_file.clone(),
            })
        } else if url.starts_with("sqlite:") {
            Ok(StorageBackend::Sqlite { url: url.to_string() })
        } else {
            anyhow::bail!("Unsupported database_url: {url} (expected \"memory\" or a sqlite: URL)")
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "stagewise=info".into(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load from `STAGEWISE_CONFIG`, falling back to `config.toml`.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(&path)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_load_config() {
        // Runs against the repository's config.toml when present.
        let result = AppConfig::load("config.toml");
        if let Ok(cfg) = result {
            assert_eq!(cfg.service.name, "stagewise");
            assert!(cfg.server.port > 0);
            assert!(cfg.storage.backend().is_ok());
        }
    }

    #[test]
    fn test_parse_full_config() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [service]
            name = "stagewise-prod"
            currency = "SAR"

            [server]
            host = "127.0.0.1"
            port = 9000

            [storage]
            database_url = "sqlite://stagewise.db"

            [validation]
            max_cash_balance = 5000000
            max_monthly_revenue = 1000000
            max_operating_costs = 1000000

            [logging]
            filter = "stagewise=debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.validation.max_cash_balance, dec!(5000000));
        assert!(cfg.logging.json);
        assert_eq!(
            cfg.storage.backend().unwrap(),
            StorageBackend::Sqlite {
                url: "sqlite://stagewise.db".into()
            }
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.service.currency, "SAR");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.logging.filter, "stagewise=info");
        assert_eq!(cfg.validation.max_operating_costs, dec!(1000000000000));
        assert_eq!(cfg.storage.backend().unwrap(), StorageBackend::Memory { state_file: None });
    }

    #[test]
    fn test_unsupported_database_url() {
        let storage = StorageConfig {
            database_url: "postgres://localhost/db".into(),
            ..Default::default()
        };
        assert!(storage.backend().is_err());
    }

    #[test]
    fn test_missing_env_var() {
        assert!(AppConfig::resolve_env("STAGEWISE_TEST_DEFINITELY_UNSET_VAR").is_err());
    }
}
