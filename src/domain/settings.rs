//! Typed settings built from a [`ConfigPort`], with built-in defaults.
//!
//! Every key is optional. Present values are validated; out-of-range or
//! malformed values are reported as `ConfigInvalid` instead of being
//! replaced by the default.

use crate::domain::engine::{EngineConfig, DEFAULT_COLLECTION_SUFFIX, DEFAULT_MAX_ATTEMPTS};
use crate::domain::error::CandleError;
use crate::domain::rate_limit::DEFAULT_REQUESTS_PER_SECOND;
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "coinbase-pro";
pub const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POOL_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub collection_suffix: String,
    pub sqlite_path: PathBuf,
    pub pool_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub requests_per_second: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub storage: StorageSettings,
    pub upstream: UpstreamSettings,
    pub max_attempts: u32,
}

impl Settings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CandleError> {
        let backend = match config.get_string("storage", "backend").as_deref() {
            None | Some("sqlite") => StorageBackend::Sqlite,
            Some("postgres") => StorageBackend::Postgres,
            Some(other) => {
                return Err(invalid(
                    "storage",
                    "backend",
                    format!("unknown backend '{other}' (expected sqlite or postgres)"),
                ));
            }
        };

        let database = config
            .get_string("storage", "database")
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let collection_suffix = config
            .get_string("storage", "collection_suffix")
            .unwrap_or_else(|| DEFAULT_COLLECTION_SUFFIX.to_string());
        if !collection_suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                "storage",
                "collection_suffix",
                "only letters, digits, '-' and '_' are allowed".to_string(),
            ));
        }

        let sqlite_path = config
            .get_string("sqlite", "path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{database}.sqlite3")));

        let storage = StorageSettings {
            backend,
            host: config
                .get_string("storage", "host")
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: int_setting(config, "storage", "port", DEFAULT_PORT as i64, 1, 65_535)? as u16,
            database,
            user: config.get_string("storage", "user"),
            password: config.get_string("storage", "password"),
            collection_suffix,
            sqlite_path,
            pool_size: int_setting(config, "sqlite", "pool_size", DEFAULT_POOL_SIZE as i64, 1, 64)?
                as u32,
        };

        let base_url = config
            .get_string("coinbase", "base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(invalid(
                "coinbase",
                "base_url",
                "must start with http:// or https://".to_string(),
            ));
        }

        let upstream = UpstreamSettings {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(int_setting(
                config,
                "coinbase",
                "timeout_secs",
                DEFAULT_TIMEOUT_SECS as i64,
                1,
                600,
            )? as u64),
            requests_per_second: int_setting(
                config,
                "coinbase",
                "requests_per_second",
                DEFAULT_REQUESTS_PER_SECOND as i64,
                1,
                100,
            )? as usize,
        };

        let max_attempts =
            int_setting(config, "engine", "max_attempts", DEFAULT_MAX_ATTEMPTS as i64, 1, 20)?
                as u32;

        Ok(Self {
            storage,
            upstream,
            max_attempts,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            collection_suffix: self.storage.collection_suffix.clone(),
            max_attempts: self.max_attempts,
        }
    }
}

fn int_setting(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
    max: i64,
) -> Result<i64, CandleError> {
    let value = config
        .get_int(section, key)
        .map_err(|reason| invalid(section, key, reason))?
        .unwrap_or(default);
    if value < min || value > max {
        return Err(invalid(
            section,
            key,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(value)
}

fn invalid(section: &str, key: &str, reason: String) -> CandleError {
    CandleError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}
