//! PostgreSQL pool settings.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

const MAX_POOL_SIZE: u32 = 100;

/// Connection pool for the ledger tables.
///
/// Without a `url` the service runs on the in-memory stores, which is only
/// accepted outside production.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://` connection string
    pub url: Option<String>,

    /// Connections kept warm
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Pool ceiling; every CAS holds one connection briefly
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection before a store error
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    /// Apply `migrations/` at startup
    #[serde(default)]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    /// Configured connection URL; blank counts as unset.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// A missing URL is an error only in production.
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        let Some(url) = self.url() else {
            if production {
                return Err(ValidationError::MissingRequired("DATABASE__URL"));
            }
            return Ok(());
        };
        if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.max_connections > MAX_POOL_SIZE {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            run_migrations: false,
        }
    }
}

fn default_min_connections() -> u32 {
    2
}

fn default_max_connections() -> u32 {
    20
}

fn default_acquire_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: &str) -> DatabaseConfig {
        DatabaseConfig {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn default_has_no_database() {
        let config = DatabaseConfig::default();
        assert!(config.url().is_none());
        assert!(!config.run_migrations);
        assert!(config.min_connections <= config.max_connections);
    }

    #[test]
    fn missing_url_is_allowed_outside_production() {
        assert!(DatabaseConfig::default().validate(false).is_ok());
        assert_eq!(
            DatabaseConfig::default().validate(true),
            Err(ValidationError::MissingRequired("DATABASE__URL"))
        );
    }

    #[test]
    fn blank_url_counts_as_missing() {
        assert!(with_url("  ").url().is_none());
    }

    #[test]
    fn non_postgres_url_is_rejected() {
        assert_eq!(
            with_url("mysql://localhost/test").validate(false),
            Err(ValidationError::InvalidDatabaseUrl)
        );
    }

    #[test]
    fn min_above_max_is_rejected() {
        let config = DatabaseConfig {
            min_connections: 10,
            max_connections: 5,
            ..with_url("postgresql://localhost/test")
        };
        assert_eq!(config.validate(false), Err(ValidationError::InvalidPoolSize));
    }

    #[test]
    fn oversized_pool_is_rejected() {
        let config = DatabaseConfig {
            max_connections: MAX_POOL_SIZE + 1,
            ..with_url("postgresql://localhost/test")
        };
        assert_eq!(config.validate(true), Err(ValidationError::PoolSizeTooLarge));
    }

    #[test]
    fn both_postgres_schemes_are_accepted() {
        assert!(with_url("postgres://localhost/ledger").validate(true).is_ok());
        assert!(with_url(" postgresql://localhost/ledger ").validate(true).is_ok());
        assert_eq!(
            with_url(" postgresql://localhost/ledger ").url(),
            Some("postgresql://localhost/ledger")
        );
    }

    #[test]
    fn acquire_timeout_converts_seconds() {
        let config = DatabaseConfig {
            acquire_timeout_secs: 10,
            ..Default::default()
        };
        assert_eq!(config.acquire_timeout(), Duration::from_secs(10));
    }
}
