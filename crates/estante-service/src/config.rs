//! Service configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use estante_db::DbConfig;

/// Default Google Books endpoint.
pub const GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com/books/v1/volumes";

/// Service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// SQLite database file (or `:memory:`)
    pub database_path: PathBuf,

    pub db_max_connections: u32,

    /// How long a cached book list stays fresh
    pub book_cache_ttl: Duration,

    /// Overall retry budget of a conflicting transaction
    pub tx_retry_max: Duration,

    /// Google Books API key (optional; anonymous quota otherwise)
    pub google_books_api_key: Option<String>,

    pub google_books_base_url: String,

    /// Timeout of one metadata HTTP call
    pub metadata_timeout: Duration,

    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = ServiceConfig {
            database_path: lookup("ESTANTE_DATABASE_PATH")
                .unwrap_or_else(|| "./estante.db".to_string())
                .into(),

            db_max_connections: parse(&lookup, "ESTANTE_DB_MAX_CONNECTIONS", 5)?,

            book_cache_ttl: Duration::from_secs(parse(&lookup, "ESTANTE_BOOK_CACHE_TTL_SECS", 30)?),

            tx_retry_max: Duration::from_millis(parse(&lookup, "ESTANTE_TX_RETRY_MAX_MS", 2000)?),

            google_books_api_key: lookup("GOOGLE_BOOKS_API_KEY").filter(|k| !k.trim().is_empty()),

            google_books_base_url: lookup("GOOGLE_BOOKS_BASE_URL")
                .unwrap_or_else(|| GOOGLE_BOOKS_BASE_URL.to_string()),

            metadata_timeout: Duration::from_secs(parse(&lookup, "ESTANTE_METADATA_TIMEOUT_SECS", 10)?),

            jwt_secret: lookup("ESTANTE_JWT_SECRET")
                .ok_or_else(|| ConfigError::MissingRequired("ESTANTE_JWT_SECRET".to_string()))?,
        };

        if config.jwt_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue("ESTANTE_JWT_SECRET".to_string()));
        }
        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("ESTANTE_DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(config)
    }

    /// In-memory database and a fixed secret, for tests and demos.
    pub fn for_tests() -> Self {
        ServiceConfig {
            database_path: ":memory:".into(),
            db_max_connections: 1,
            book_cache_ttl: Duration::from_secs(30),
            tx_retry_max: Duration::from_millis(2000),
            google_books_api_key: None,
            google_books_base_url: GOOGLE_BOOKS_BASE_URL.to_string(),
            metadata_timeout: Duration::from_secs(10),
            jwt_secret: "estante-test-secret".to_string(),
        }
    }

    /// Database settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        let base = if self.database_path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database_path).max_connections(self.db_max_connections)
        };
        base.tx_retry_budget(self.tx_retry_max)
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[("ESTANTE_JWT_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.database_path, PathBuf::from("./estante.db"));
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.book_cache_ttl, Duration::from_secs(30));
        assert_eq!(config.tx_retry_max, Duration::from_millis(2000));
        assert_eq!(config.google_books_base_url, GOOGLE_BOOKS_BASE_URL);
        assert!(config.google_books_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("ESTANTE_JWT_SECRET", "s3cret"),
            ("ESTANTE_DATABASE_PATH", "/var/lib/estante.db"),
            ("ESTANTE_BOOK_CACHE_TTL_SECS", "5"),
            ("GOOGLE_BOOKS_API_KEY", "abc"),
        ]))
        .unwrap();

        assert_eq!(config.book_cache_ttl, Duration::from_secs(5));
        assert_eq!(config.google_books_api_key.as_deref(), Some("abc"));
        assert_eq!(config.db_config().database_path, PathBuf::from("/var/lib/estante.db"));
    }

    #[test]
    fn test_missing_secret() {
        let result = ServiceConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));

        let result = ServiceConfig::from_lookup(lookup(&[("ESTANTE_JWT_SECRET", "  ")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_malformed_number() {
        let result = ServiceConfig::from_lookup(lookup(&[
            ("ESTANTE_JWT_SECRET", "s3cret"),
            ("ESTANTE_DB_MAX_CONNECTIONS", "many"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(key)) if key == "ESTANTE_DB_MAX_CONNECTIONS"));
    }
}
