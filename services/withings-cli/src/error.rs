//! CLI error types

use thiserror::Error;

/// Errors from configuration, argument parsing and token-file handling.
///
/// API failures keep their `withings_core::Error` type and are reported by
/// `main` through anyhow.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Token file error: {0}")]
    TokenFile(String),

    #[error("Usage: {0}")]
    Usage(String),
}

/// Result alias using the CLI Error
pub type Result<T> = std::result::Result<T, Error>;
