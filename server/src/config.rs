// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::time::Duration;

const DEFAULT_DB_URL: &str = "sqlite://database/taskdesk.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STORAGE_DIR: &str = "database/evidence";
const DEFAULT_ROLLOVER_CHECK_SECS: u64 = 5 * 60;

/// Runtime configuration, read from `TASKDESK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub storage_dir: PathBuf,
    pub rollover_check: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            lookup("TASKDESK_DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        let bind_raw =
            lookup("TASKDESK_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse()
            .with_context(|| format!("Invalid TASKDESK_BIND_ADDR '{}'", bind_raw))?;

        let storage_dir = lookup("TASKDESK_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));

        let rollover_secs = match lookup("TASKDESK_ROLLOVER_CHECK_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("Invalid TASKDESK_ROLLOVER_CHECK_SECS '{}'", raw))?,
            None => DEFAULT_ROLLOVER_CHECK_SECS,
        };
        if rollover_secs == 0 {
            anyhow::bail!("TASKDESK_ROLLOVER_CHECK_SECS must be greater than zero");
        }

        Ok(Self {
            database_url,
            bind_addr,
            storage_dir,
            rollover_check: Duration::from_secs(rollover_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DB_URL);
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.rollover_check, Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup_from(&[("TASKDESK_BIND_ADDR", "nowhere")])).is_err());
        assert!(
            Config::from_lookup(lookup_from(&[("TASKDESK_ROLLOVER_CHECK_SECS", "0")])).is_err()
        );
    }
}
