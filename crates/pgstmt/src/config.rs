//! Session configuration.

use crate::error::{StmtError, StmtResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the connection string.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
/// Environment variable holding the statement timeout in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "PGSTMT_TIMEOUT_MS";
/// Environment variable holding the maximum pool size.
pub const ENV_POOL_SIZE: &str = "PGSTMT_POOL_SIZE";

/// Configuration for a [`crate::Session`].
///
/// Deserializable, so it can sit inside an application's own config file:
///
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct AppConfig {
///     db: pgstmt::SessionConfig,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-statement timeout, layered onto every execution context.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Option<Duration>,
    /// Upper bound of pooled connections.
    pub max_pool_size: usize,
    /// Postgres connection string.
    pub database_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_pool_size: 16,
            database_url: None,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-statement timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the connection string.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Read `DATABASE_URL`, `PGSTMT_TIMEOUT_MS` and `PGSTMT_POOL_SIZE`.
    ///
    /// Unset variables keep their defaults; malformed numbers are a
    /// [`StmtError::Config`].
    pub fn from_env() -> StmtResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StmtResult<Self> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            config.database_url = Some(url);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let ms: u64 = parse_number(ENV_TIMEOUT_MS, &raw)?;
            config.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            let size: usize = parse_number(ENV_POOL_SIZE, &raw)?;
            if size == 0 {
                return Err(StmtError::Config(format!("{ENV_POOL_SIZE} must be at least 1")));
            }
            config.max_pool_size = size;
        }
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> StmtResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| StmtError::Config(format!("{key}: expected a non-negative integer, got {raw:?}")))
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&(d.as_millis() as u64)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(de)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = SessionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.max_pool_size, 16);
    }

    #[test]
    fn reads_every_variable() {
        let config = SessionConfig::from_lookup(lookup(&[
            (ENV_DATABASE_URL, "postgres://localhost/app"),
            (ENV_TIMEOUT_MS, "1500"),
            (ENV_POOL_SIZE, " 4 "),
        ]))
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.max_pool_size, 4);
    }

    #[test]
    fn zero_timeout_means_none() {
        let config = SessionConfig::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "0")])).unwrap();
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let err = SessionConfig::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, StmtError::Config(_)));

        let err = SessionConfig::from_lookup(lookup(&[(ENV_POOL_SIZE, "0")])).unwrap_err();
        assert!(matches!(err, StmtError::Config(_)));
    }

    #[test]
    fn deserializes_from_json() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"timeout_ms": 250, "database_url": "postgres://db"}"#).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.max_pool_size, 16);
        assert_eq!(config.database_url.as_deref(), Some("postgres://db"));

        let json = serde_json::to_value(SessionConfig::new().timeout(Duration::from_secs(2))).unwrap();
        assert_eq!(json["timeout_ms"], 2000);
    }
}
