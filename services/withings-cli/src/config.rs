//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from the WITHINGS_CLIENT_SECRET env var or
//! client_secret_file, never stored in the TOML directly to avoid leaking it.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use withings_core::{BASE_URL, ConnectUrlParams, Scope, Secret};

use crate::error::{Error, Result};

/// Env var holding the client secret.
pub const CLIENT_SECRET_ENV: &str = "WITHINGS_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub withings: WithingsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application registration and API settings
#[derive(Debug, Deserialize)]
pub struct WithingsConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret>,
    /// Path to a file containing the client secret (alternative to the env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub redirect_uri: String,
    /// Requested scopes; empty means all
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub demo: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Where the CLI keeps its token data between runs
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
        }
    }
}

fn default_base_url() -> String {
    BASE_URL.to_owned()
}

fn default_timeout() -> u64 {
    30
}

fn default_token_file() -> PathBuf {
    PathBuf::from("withings-tokens.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. WITHINGS_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.withings.client_id.trim().is_empty() {
            return Err(Error::Config("client_id must not be empty".into()));
        }

        if config.withings.redirect_uri.trim().is_empty() {
            return Err(Error::Config("redirect_uri must not be empty".into()));
        }

        if !config.withings.base_url.starts_with("http://")
            && !config.withings.base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.withings.base_url
            )));
        }

        if config.withings.timeout_secs == 0 {
            return Err(Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        // Env var takes precedence over file
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            config.withings.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.withings.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.withings.client_secret = Some(Secret::new(secret));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("withings.toml")
    }

    /// The client secret, required by every command that talks to the API.
    pub fn client_secret(&self) -> Result<&str> {
        self.withings
            .client_secret
            .as_ref()
            .map(|s| s.expose().as_str())
            .ok_or_else(|| {
                Error::Config(format!(
                    "client secret missing: set {CLIENT_SECRET_ENV} or client_secret_file"
                ))
            })
    }

    /// Authorization URL parameters for the configured application.
    pub fn connect_url_params(&self) -> ConnectUrlParams {
        ConnectUrlParams {
            scope: (!self.withings.scopes.is_empty()).then(|| self.withings.scopes.clone()),
            demo: self.withings.demo,
            ..ConnectUrlParams::new(&self.withings.client_id, &self.withings.redirect_uri)
        }
    }
}
