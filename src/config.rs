//! Service-level tuning read from environment variables.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MAILSHOT_POOL_MAX_CONNECTIONS` | `5` | Connections per bulk transport, and jobs admitted at once |
//! | `MAILSHOT_POOL_MAX_MESSAGES` | `100` | Messages per connection before it is recycled |
//! | `MAILSHOT_CONNECTION_TIMEOUT_SECS` | `10` | Single-send connect timeout |
//! | `MAILSHOT_GREETING_TIMEOUT_SECS` | `5` | Single-send greeting timeout |
//! | `MAILSHOT_SOCKET_TIMEOUT_SECS` | `10` | Single-send socket timeout |

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DispatchError;
use crate::transport::{PoolSettings, Timeouts};

pub const POOL_MAX_CONNECTIONS: &str = "MAILSHOT_POOL_MAX_CONNECTIONS";
pub const POOL_MAX_MESSAGES: &str = "MAILSHOT_POOL_MAX_MESSAGES";
pub const CONNECTION_TIMEOUT_SECS: &str = "MAILSHOT_CONNECTION_TIMEOUT_SECS";
pub const GREETING_TIMEOUT_SECS: &str = "MAILSHOT_GREETING_TIMEOUT_SECS";
pub const SOCKET_TIMEOUT_SECS: &str = "MAILSHOT_SOCKET_TIMEOUT_SECS";

/// Pool limits and timeouts used by a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Limits for bulk (pooled) transports.
    pub pool: PoolSettings,
    /// Timeouts for single-send transports.
    pub timeouts: Timeouts,
}

impl DispatchConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, DispatchError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read overrides through `lookup`, falling back to defaults.
    ///
    /// ```
    /// use mailshot::DispatchConfig;
    ///
    /// let config = DispatchConfig::from_lookup(|name| match name {
    ///     "MAILSHOT_POOL_MAX_CONNECTIONS" => Some("2".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.pool.max_connections, 2);
    /// assert_eq!(config.pool.max_messages, 100);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DispatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let pool = PoolSettings {
            max_connections: positive(&lookup, POOL_MAX_CONNECTIONS, defaults.pool.max_connections)?,
            max_messages: positive(&lookup, POOL_MAX_MESSAGES, defaults.pool.max_messages)?,
        };

        let timeouts = Timeouts {
            connection: seconds(&lookup, CONNECTION_TIMEOUT_SECS, defaults.timeouts.connection)?,
            greeting: seconds(&lookup, GREETING_TIMEOUT_SECS, defaults.timeouts.greeting)?,
            socket: seconds(&lookup, SOCKET_TIMEOUT_SECS, defaults.timeouts.socket)?,
        };

        Ok(Self { pool, timeouts })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, DispatchError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            DispatchError::Configuration(format!("{} has invalid value '{}': {}", name, raw, e))
        }),
    }
}

fn positive<F>(lookup: &F, name: &str, default: usize) -> Result<usize, DispatchError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<F, usize>(lookup, name)? {
        None => Ok(default),
        Some(0) => Err(DispatchError::Configuration(format!(
            "{} must be positive",
            name
        ))),
        Some(n) => Ok(n),
    }
}

fn seconds<F>(lookup: &F, name: &str, default: Duration) -> Result<Duration, DispatchError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<F, u64>(lookup, name)? {
        None => Ok(default),
        Some(0) => Err(DispatchError::Configuration(format!(
            "{} must be positive",
            name
        ))),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}
