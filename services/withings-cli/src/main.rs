//! Withings CLI
//!
//! Small host around the Withings client crates:
//! 1. Loads the TOML config and the client secret
//! 2. Drives the authorization-code flow (`authorize`, `connect`)
//! 3. Rehydrates stored tokens and runs one API command
//! 4. Persists rotated tokens reported by the refresh listener
//!
//! Results go to stdout as pretty JSON; logs go to stderr.

mod cli;
mod config;
mod error;
mod token_file;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::TryStreamExt;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use withings_api::{MeasureGroup, MeasureQuery, Withings};
use withings_core::{
    ApiClient, ConnectConfig, Credentials, ListenerError, RefreshListener, TokenData, connect_url,
};

use crate::cli::{Command, Invocation, USAGE};
use crate::config::Config;

type ListenerResult = std::result::Result<(), ListenerError>;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output on stderr and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let invocation = match Invocation::parse(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(e) => anyhow::bail!("{e}\n\n{USAGE}"),
    };

    let cli_config_path = invocation
        .config_path
        .as_deref()
        .and_then(|p| p.to_str());
    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    if invocation.command == Command::Authorize {
        let connect = connect_url(&config.connect_url_params())
            .context("failed to build authorization URL")?;
        return print_json(&connect);
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.withings.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let client = ApiClient::new(http).with_base_url(config.withings.base_url.clone());
    let client_secret = config.client_secret()?.to_owned();
    let token_path = config.storage.token_file.as_path();

    if let Command::Connect { code } = &invocation.command {
        let credentials = client
            .connect(&ConnectConfig {
                client_id: config.withings.client_id.clone(),
                client_secret,
                redirect_uri: config.withings.redirect_uri.clone(),
                authorization_code: code.clone(),
            })
            .await
            .context("authorization code exchange failed")?;
        let data = credentials
            .to_token_data()
            .await
            .context("token endpoint returned no access token")?;
        token_file::save(token_path, &data)
            .await
            .with_context(|| format!("failed to save tokens to {}", token_path.display()))?;
        info!(user_id = ?data.user_id, "connected");
        return print_json(&token_summary(&data));
    }

    let stored = token_file::load(token_path)
        .await
        .with_context(|| format!("failed to read tokens from {}", token_path.display()))?
        .with_context(|| {
            format!(
                "no tokens at {}; run `withings authorize` then `withings connect <code>`",
                token_path.display()
            )
        })?;
    let credentials = Arc::new(Credentials::from_token_data(
        config.withings.client_id.clone(),
        client_secret,
        stored,
    ));

    // The listener only forwards; the file is written once the command is done
    let (tx, mut rx) = mpsc::unbounded_channel::<TokenData>();
    let listener: RefreshListener = Arc::new(move |data: &TokenData| -> ListenerResult {
        tx.send(data.clone())?;
        Ok(())
    });
    credentials.on(listener).await;

    let session = Withings::new(client, credentials);
    let outcome = run(&session, invocation.command).await;

    let mut latest = None;
    while let Ok(data) = rx.try_recv() {
        latest = Some(data);
    }
    if let Some(data) = latest {
        persist(token_path, &data).await?;
    }

    print_json(&outcome?)
}

/// Run one token-backed command and return what to print.
async fn run(session: &Withings, command: Command) -> Result<Value> {
    let value = match command {
        Command::Refresh => {
            let data = session
                .client()
                .refresh(session.credentials())
                .await
                .context("token refresh failed")?;
            token_summary(&data)
        }
        Command::Devices => serde_json::to_value(session.user().get_devices().await?)?,
        Command::Goals => serde_json::to_value(session.user().get_goals().await?)?,
        Command::Measures { types, category } => {
            let groups: Vec<MeasureGroup> = session
                .measure()
                .stream_measures(MeasureQuery::new(types, category))
                .try_collect()
                .await?;
            info!(groups = groups.len(), "fetched measures");
            serde_json::to_value(groups)?
        }
        Command::NotifyList => serde_json::to_value(session.notify().list(None).await?)?,
        Command::Authorize | Command::Connect { .. } => {
            anyhow::bail!("command does not use stored tokens")
        }
    };
    Ok(value)
}

async fn persist(path: &Path, data: &TokenData) -> Result<()> {
    match token_file::save(path, data).await {
        Ok(()) => {
            info!(path = %path.display(), "saved refreshed tokens");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "failed to save refreshed tokens");
            Err(e).with_context(|| format!("failed to save tokens to {}", path.display()))
        }
    }
}

/// Token facts safe to print: never the tokens themselves.
fn token_summary(data: &TokenData) -> Value {
    json!({
        "userId": data.user_id,
        "expires": data.expires,
        "hasRefreshToken": data.refresh_token.is_some(),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
