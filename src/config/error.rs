//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Webhook body limit must be between 1 KiB and 1 MiB")]
    InvalidEventBodyLimit,

    #[error("max_cas_attempts must be between 1 and 64")]
    InvalidCasAttempts,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Upload limit must be greater than zero")]
    InvalidUploadLimit,

    #[error("Analyzer endpoint must be an http(s) URL")]
    InvalidAnalyzerEndpoint,

    #[error("Analyzer endpoint must use HTTPS in production")]
    AnalyzerMustBeHttps,

    #[error("Admin token must be at least {0} characters")]
    AdminTokenTooShort(usize),
}
