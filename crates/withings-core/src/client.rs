//! Call dispatcher
//!
//! Every Withings call is a form-encoded POST to `{base_url}/{service}` with
//! an `action` field, answered by a JSON envelope:
//!
//! ```text
//! { "status": 0, "body": { ... } }          success
//! { "status": 401, "error": "..." }          failure
//! ```
//!
//! `ApiClient::call` resolves a bearer token (refreshing the credentials in
//! place when the token is stale), sends the request and turns the envelope
//! into either the `body` value or an [`ApiError`].

use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::action::Action;
use crate::constants::BASE_URL;
use crate::credentials::Credentials;
use crate::error::{ApiError, ApiErrorData, Error, Result};

/// Parameters never copied verbatim into error diagnostics.
const REDACTED_PARAMS: &[&str] = &["client_secret", "refresh_token", "code"];

/// Request parameters of one call.
///
/// A flat map of scalar values. `Null` entries (including `None` options)
/// are kept for diagnostics but never transmitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Like [`Params::to_value`] with secrets and tokens replaced by
    /// `[REDACTED]`, for error diagnostics.
    pub fn to_redacted_value(&self) -> Value {
        let mut map = self.0.clone();
        for key in REDACTED_PARAMS {
            if let Some(value) = map.get_mut(*key) {
                *value = Value::String("[REDACTED]".to_owned());
            }
        }
        Value::Object(map)
    }

    /// Form fields for `{action, ...params}`.
    ///
    /// Strings go out verbatim, other scalars as their JSON text. A parameter
    /// named `action` overrides the action field.
    pub(crate) fn to_form(&self, action: Action) -> Vec<(String, String)> {
        let mut form = vec![("action".to_owned(), action.name().to_owned())];
        for (key, value) in &self.0 {
            let Some(value) = form_value(value) else {
                continue;
            };
            if key == "action" {
                form[0].1 = value;
            } else {
                form.push((key.clone(), value));
            }
        }
        form
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn form_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Dispatcher for Withings API calls.
///
/// Cheap to clone; clones share the underlying `reqwest::Client` and its
/// connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl ApiClient {
    /// Client for the production API using the given HTTP client.
    ///
    /// Timeouts and TLS settings belong on the `reqwest::Client`.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: BASE_URL.to_owned(),
        }
    }

    /// Point the client at another API root (staging, a local mock).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one call and return the envelope `body`.
    ///
    /// With credentials, a bearer token is resolved first, refreshing the
    /// credentials in place if the token is stale. Without credentials the
    /// call is anonymous (the token exchange itself).
    pub async fn call(
        &self,
        action: Action,
        params: Params,
        credentials: Option<&Credentials>,
    ) -> Result<Value> {
        let token = match credentials {
            Some(credentials) => self.resolve_bearer_token(credentials).await?,
            None => None,
        };
        self.send(action, &params, token.as_deref()).await
    }

    /// Like [`ApiClient::call`], deserializing the body into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        action: Action,
        params: Params,
        credentials: Option<&Credentials>,
    ) -> Result<T> {
        let body = self.call(action, params, credentials).await?;
        decode_body(action, body)
    }

    /// Send a request with an already-resolved token.
    ///
    /// Token refresh goes through here directly so that it never re-enters
    /// token resolution.
    pub(crate) async fn send(
        &self,
        action: Action,
        params: &Params,
        token: Option<&str>,
    ) -> Result<Value> {
        let service = action.service();
        let url = format!("{}/{}", self.base_url, service);

        let mut request = self.http.post(&url).form(&params.to_form(action));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        debug!(%service, %action, authenticated = token.is_some(), "calling withings api");

        let response = request.send().await.map_err(|e| {
            counter!("withings_api_requests_total", "service" => service.as_str(), "outcome" => "transport_error").increment(1);
            Error::Http(format!("POST {url} failed: {e}"))
        })?;

        let envelope: Value = response.json().await.map_err(|e| {
            counter!("withings_api_requests_total", "service" => service.as_str(), "outcome" => "decode_error").increment(1);
            Error::Decode(format!("response to /{service} action {action} is not JSON: {e}"))
        })?;

        unwrap_envelope(action, params, envelope)
    }
}

/// Split a decoded envelope into the success body or an [`ApiError`].
fn unwrap_envelope(action: Action, params: &Params, mut envelope: Value) -> Result<Value> {
    let service = action.service();
    let status = envelope
        .get("status")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            Error::Decode(format!(
                "response to /{service} action {action} has no numeric status"
            ))
        })?;

    if status == 0 {
        counter!("withings_api_requests_total", "service" => service.as_str(), "outcome" => "success").increment(1);
        let body = envelope
            .as_object_mut()
            .and_then(|o| o.remove("body"))
            .unwrap_or(Value::Null);
        return Ok(body);
    }

    counter!("withings_api_requests_total", "service" => service.as_str(), "outcome" => "api_error").increment(1);
    let reason = envelope
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("no error message");
    let message =
        format!("Call to /{service} with action {action} failed with status {status}: {reason}");
    warn!(%service, %action, status, "withings api call failed");

    Err(Error::Api(ApiError {
        message,
        status,
        data: ApiErrorData {
            parameters: params.to_redacted_value(),
            response: envelope,
        },
    }))
}

fn decode_body<T: DeserializeOwned>(action: Action, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| {
        Error::Decode(format!(
            "unexpected body for /{} action {action}: {e}",
            action.service()
        ))
    })
}
