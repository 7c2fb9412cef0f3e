//! Store configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;

/// Environment variable holding the `PostgreSQL` connection URL.
pub const DATABASE_URL_VAR: &str = "ESFACADE_DATABASE_URL";
const OPERATION_TIMEOUT_VAR: &str = "ESFACADE_OPERATION_TIMEOUT_MS";
const MAX_OPERATION_ATTEMPTS_VAR: &str = "ESFACADE_MAX_OPERATION_ATTEMPTS";
const RETRY_DELAY_VAR: &str = "ESFACADE_RETRY_DELAY_MS";
const MAX_CONNECTIONS_VAR: &str = "ESFACADE_MAX_CONNECTIONS";

/// Per-attempt timeout used when none is configured.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3);
/// Attempts per operation when none is configured: one hour of 3 s attempts.
pub const DEFAULT_MAX_OPERATION_ATTEMPTS: u32 = 60 * 60 / 3;
/// Pause between attempts when none is configured.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Pool size when none is configured.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// A variable is set to something unusable.
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        /// The offending variable.
        key: &'static str,
        /// Its value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Connection and retry settings for the `PostgreSQL` stream store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `PostgreSQL` connection URL.
    pub database_url: String,
    /// Bound on a single attempt of a backend operation.
    pub operation_timeout: Duration,
    /// Attempts per operation before the connection is declared lost.
    pub max_operation_attempts: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Pool size.
    pub max_connections: u32,
}

impl StoreConfig {
    /// Creates a configuration with default retry settings.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            max_operation_attempts: DEFAULT_MAX_OPERATION_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the database URL is missing or a numeric
    /// setting does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the database URL is missing or a numeric
    /// setting does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(DATABASE_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;
        let mut config = Self::new(database_url);

        if let Some(ms) = parse_positive(&lookup, OPERATION_TIMEOUT_VAR)? {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_positive(&lookup, MAX_OPERATION_ATTEMPTS_VAR)? {
            config.max_operation_attempts = narrow(MAX_OPERATION_ATTEMPTS_VAR, attempts)?;
        }
        if let Some(ms) = parse_positive(&lookup, RETRY_DELAY_VAR)? {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(connections) = parse_positive(&lookup, MAX_CONNECTIONS_VAR)? {
            config.max_connections = narrow(MAX_CONNECTIONS_VAR, connections)?;
        }
        Ok(config)
    }

    /// Upper bound on one facade call: every attempt timing out, with a
    /// retry delay between each.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        (self.operation_timeout + self.retry_delay).saturating_mul(self.max_operation_attempts)
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            value,
            reason: "must be positive".into(),
        }),
        Ok(n) => Ok(Some(n)),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

fn narrow(key: &'static str, value: u64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|e| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
