use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Deadline for each individual row-store call. `None` waits forever.
    pub call_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://bot.db".into(),
            max_connections: 5,
            call_timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let database_url = var("DATABASE_URL").unwrap_or(defaults.database_url);

        let max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive integer, got {v:?}"))?,
            None => defaults.max_connections,
        };

        let call_timeout = match var("DB_CALL_TIMEOUT_MS") {
            Some(v) => {
                let ms = v
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("DB_CALL_TIMEOUT_MS must be milliseconds, got {v:?}"))?;
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            None => defaults.call_timeout,
        };

        Ok(Self {
            database_url,
            max_connections,
            call_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.database_url, "sqlite://bot.db");
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.call_timeout, None);
    }

    #[test]
    fn reads_all_variables() {
        let cfg = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DB_MAX_CONNECTIONS", "2"),
            ("DB_CALL_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.max_connections, 2);
        assert_eq!(cfg.call_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn zero_timeout_means_none() {
        let cfg = Config::from_lookup(lookup(&[("DB_CALL_TIMEOUT_MS", "0")])).unwrap();
        assert_eq!(cfg.call_timeout, None);
    }

    #[test]
    fn garbage_numbers_are_errors() {
        let err = Config::from_lookup(lookup(&[("DB_MAX_CONNECTIONS", "many")])).unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }
}
