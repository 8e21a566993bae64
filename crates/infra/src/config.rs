//! Environment configuration for the synchronization pipeline.
//!
//! Every setting has a default except `DATABASE_URL`, which only the binary
//! requires. Values that are present but unparsable are errors, not defaults.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::metadata::{OpenLibraryConfig, RetryPolicy};
use crate::metadata::open_library::DEFAULT_BASE_URL;
use crate::transport::{DEFAULT_CONSUMER_GROUP, DEFAULT_DLQ_KEY, DEFAULT_STREAM_KEY, StreamsConfig};
use crate::workers::SyncWorkerConfig;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not set")]
    Missing { name: &'static str },

    #[error("{name}='{value}' is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn require_url(&self) -> Result<&str, ConfigError> {
        self.url.as_deref().ok_or(ConfigError::Missing {
            name: "DATABASE_URL",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub open_library: OpenLibraryConfig,
    pub database: DatabaseConfig,
    pub redis_url: String,
    pub streams: StreamsConfig,
    pub worker: SyncWorkerConfig,
}

impl SyncConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup` (variable name → value).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let open_library = OpenLibraryConfig {
            base_url: env.string("OPEN_LIBRARY_BASE_URL", DEFAULT_BASE_URL),
            connect_timeout: env.millis("OPEN_LIBRARY_CONNECT_TIMEOUT_MS", 2_000)?,
            response_timeout: env.millis("OPEN_LIBRARY_RESPONSE_TIMEOUT_MS", 2_000)?,
            retry: RetryPolicy::fixed(
                env.positive("OPEN_LIBRARY_MAX_ATTEMPTS", 3)?,
                env.millis("OPEN_LIBRARY_RETRY_DELAY_MS", 200)?,
            ),
            headers: match env.get("OPEN_LIBRARY_HEADERS") {
                Some(raw) => parse_headers(&raw)?,
                None => Vec::new(),
            },
        };

        let database = DatabaseConfig {
            url: env.get("DATABASE_URL"),
            max_connections: env.positive("DATABASE_MAX_CONNECTIONS", 5)?,
        };

        let streams = StreamsConfig {
            stream_key: env.string("SYNC_STREAM_KEY", DEFAULT_STREAM_KEY),
            dlq_key: env.string("SYNC_DLQ_KEY", DEFAULT_DLQ_KEY),
            group: env.string("SYNC_CONSUMER_GROUP", DEFAULT_CONSUMER_GROUP),
            max_deliveries: env.positive("SYNC_MAX_DELIVERIES", 5)?,
            visibility_timeout: env.millis("SYNC_VISIBILITY_TIMEOUT_MS", 60_000)?,
        };

        let worker = SyncWorkerConfig::default().with_concurrency(env.positive("SYNC_WORKERS", 4)?);

        Ok(Self {
            open_library,
            database,
            redis_url: env.string("REDIS_URL", DEFAULT_REDIS_URL),
            streams,
            worker,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn positive<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default + Copy,
        T::Err: std::fmt::Display,
    {
        let value = self.parse(name, default)?;
        if value <= T::default() {
            return Err(ConfigError::Invalid {
                name,
                value: self.get(name).unwrap_or_default(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    }

    fn millis(&self, name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
        self.parse(name, default_ms).map(Duration::from_millis)
    }
}

/// Parse `Name:value,Name2:value2`.
fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ConfigError::Invalid {
                name: "OPEN_LIBRARY_HEADERS",
                value: raw.to_string(),
                reason: format!("'{}' is not a Name:value pair", pair),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<SyncConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();

        assert_eq!(cfg.open_library.base_url, "https://openlibrary.org");
        assert_eq!(cfg.open_library.connect_timeout, Duration::from_secs(2));
        assert_eq!(cfg.open_library.response_timeout, Duration::from_secs(2));
        assert_eq!(cfg.open_library.retry.max_attempts, 3);
        assert_eq!(cfg.open_library.retry.delay, Duration::from_millis(200));
        assert!(cfg.open_library.headers.is_empty());
        assert_eq!(cfg.database.url, None);
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.redis_url, "redis://localhost:6379");
        assert_eq!(cfg.streams, StreamsConfig::default());
        assert_eq!(cfg.worker.concurrency, 4);
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("OPEN_LIBRARY_BASE_URL", "http://localhost:9000"),
            ("OPEN_LIBRARY_MAX_ATTEMPTS", "5"),
            ("OPEN_LIBRARY_RESPONSE_TIMEOUT_MS", "750"),
            ("OPEN_LIBRARY_HEADERS", "X-Custom-Auth: Duke42, X-Customer-Id:42"),
            ("DATABASE_URL", "postgres://localhost/books"),
            ("SYNC_WORKERS", "8"),
            ("SYNC_MAX_DELIVERIES", "2"),
            ("SYNC_VISIBILITY_TIMEOUT_MS", "1500"),
        ])
        .unwrap();

        assert_eq!(cfg.open_library.base_url, "http://localhost:9000");
        assert_eq!(cfg.open_library.retry.max_attempts, 5);
        assert_eq!(cfg.open_library.response_timeout, Duration::from_millis(750));
        assert_eq!(
            cfg.open_library.headers,
            vec![
                ("X-Custom-Auth".to_string(), "Duke42".to_string()),
                ("X-Customer-Id".to_string(), "42".to_string()),
            ]
        );
        assert_eq!(cfg.database.require_url().unwrap(), "postgres://localhost/books");
        assert_eq!(cfg.worker.concurrency, 8);
        assert_eq!(cfg.streams.max_deliveries, 2);
        assert_eq!(cfg.streams.visibility_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config(&[("REDIS_URL", "   "), ("SYNC_WORKERS", "")]).unwrap();
        assert_eq!(cfg.redis_url, "redis://localhost:6379");
        assert_eq!(cfg.worker.concurrency, 4);
    }

    #[test]
    fn unparsable_numbers_are_errors() {
        let err = config(&[("OPEN_LIBRARY_CONNECT_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "OPEN_LIBRARY_CONNECT_TIMEOUT_MS", .. }
        ));
    }

    #[test]
    fn zero_counts_are_rejected() {
        let err = config(&[("OPEN_LIBRARY_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "OPEN_LIBRARY_MAX_ATTEMPTS", .. }));

        let err = config(&[("SYNC_WORKERS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SYNC_WORKERS", .. }));
    }

    #[test]
    fn malformed_header_pairs_are_rejected() {
        let err = config(&[("OPEN_LIBRARY_HEADERS", "X-Custom-Auth")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "OPEN_LIBRARY_HEADERS", .. }));
    }

    #[test]
    fn database_url_is_only_required_on_demand() {
        let cfg = config(&[]).unwrap();
        assert_eq!(
            cfg.database.require_url().unwrap_err(),
            ConfigError::Missing { name: "DATABASE_URL" }
        );
    }
}
