//! Authorization-code flow entry points
//!
//! `connect_url` builds the browser redirect that asks a user to grant
//! access; `ApiClient::connect` completes the flow once Withings redirects
//! back with an authorization code.
//!
//! The `state` parameter is an opaque value for CSRF protection. Withings
//! returns it unchanged on the callback; storing and comparing it is the
//! caller's job.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::constants::{AUTHORIZE_ENDPOINT, DEMO_MODE, RESPONSE_TYPE};
use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// Data a Withings application may request access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "user.info")]
    UserInfo,
    #[serde(rename = "user.metrics")]
    UserMetrics,
    #[serde(rename = "user.activity")]
    UserActivity,
    #[serde(rename = "user.sleepevents")]
    UserSleepEvents,
}

impl Scope {
    /// Every scope, in the order they are requested by default.
    pub const ALL: [Scope; 4] = [
        Scope::UserInfo,
        Scope::UserMetrics,
        Scope::UserActivity,
        Scope::UserSleepEvents,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::UserInfo => "user.info",
            Scope::UserMetrics => "user.metrics",
            Scope::UserActivity => "user.activity",
            Scope::UserSleepEvents => "user.sleepevents",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Scope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown scope: {s}")))
    }
}

/// Inputs of [`connect_url`].
#[derive(Debug, Clone, Default)]
pub struct ConnectUrlParams {
    pub client_id: String,
    pub redirect_uri: String,
    /// Requested scopes; `None` requests [`Scope::ALL`].
    pub scope: Option<Vec<Scope>>,
    /// Open the Withings demo account instead of the user's own data.
    pub demo: bool,
    /// CSRF state; `None` generates a random UUID.
    pub state: Option<String>,
}

impl ConnectUrlParams {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            ..Self::default()
        }
    }
}

/// Authorization URL plus the state value embedded in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectUrl {
    pub url: String,
    pub state: String,
}

/// Build the browser authorization URL.
///
/// Fails with `InvalidConfig` when the client id or redirect URI is empty.
pub fn connect_url(params: &ConnectUrlParams) -> Result<ConnectUrl> {
    require("client_id", &params.client_id)?;
    require("redirect_uri", &params.redirect_uri)?;

    let state = params
        .state
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let scopes = params.scope.as_deref().unwrap_or(&Scope::ALL);
    let scope = scopes
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",");

    let mut url = Url::parse(AUTHORIZE_ENDPOINT)
        .map_err(|e| Error::InvalidConfig(format!("authorize endpoint: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", RESPONSE_TYPE)
            .append_pair("client_id", &params.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("scope", &scope);
        if params.demo {
            query.append_pair("mode", DEMO_MODE);
        }
        query.append_pair("state", &state);
    }

    Ok(ConnectUrl {
        url: url.into(),
        state,
    })
}

/// Inputs of [`ApiClient::connect`].
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorization_code: String,
}

impl ApiClient {
    /// Complete the authorization-code flow.
    ///
    /// Returns new credentials; existing instances are left alone. Empty
    /// redirect URI or code fail with `InvalidConfig` before any request.
    pub async fn connect(&self, config: &ConnectConfig) -> Result<Credentials> {
        require("client_id", &config.client_id)?;
        require("redirect_uri", &config.redirect_uri)?;
        require("authorization_code", &config.authorization_code)?;
        self.exchange_authorization_code(
            &config.client_id,
            &config.client_secret,
            &config.redirect_uri,
            &config.authorization_code,
        )
        .await
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidConfig(format!("{name} must not be empty")));
    }
    Ok(())
}
