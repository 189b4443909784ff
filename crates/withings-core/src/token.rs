//! OAuth token exchange, refresh and bearer resolution
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (initial OAuth flow completion)
//! 2. Token refresh (request-time, when the access token is stale)
//!
//! Both are `oauth2/requesttoken` calls with different grant types. They go
//! through the normal envelope handling, so a rejected refresh surfaces as an
//! `Error::Api` like any other call.

use metrics::counter;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::client::{ApiClient, Params};
use crate::credentials::{Credentials, TokenData, TokenStatus, now_millis};
use crate::error::{Error, Result};

/// Body of a successful `requesttoken` call.
///
/// `expires_in` is a delta in seconds from the response time. It is turned
/// into an absolute unix millisecond timestamp when stored.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Withings user id; the API sends it as a string or a number
    #[serde(
        default,
        rename = "userid",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
}

impl TokenResponse {
    /// Absolute expiry in unix milliseconds, counted from `now_millis`.
    pub fn expires_at(&self, now_millis: u64) -> u64 {
        now_millis.saturating_add(self.expires_in.saturating_mul(1000))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

impl ApiClient {
    /// Bearer token to send for `credentials`.
    ///
    /// - never authenticated: `None`, the call goes out without a token
    /// - token still valid: the current token, no network call
    /// - token expired: refresh in place, then the new token
    ///
    /// Concurrent callers that find the same stale token wait on the
    /// credentials' refresh gate; only the first one refreshes, the others
    /// pick up its result.
    pub async fn resolve_bearer_token(&self, credentials: &Credentials) -> Result<Option<String>> {
        match credentials.status_at(now_millis()).await {
            TokenStatus::Missing => Ok(None),
            TokenStatus::Fresh(token) => Ok(Some(token)),
            TokenStatus::Stale => {
                let _gate = credentials.lock_refresh().await;
                // Another caller may have refreshed while we waited.
                if let TokenStatus::Fresh(token) = credentials.status_at(now_millis()).await {
                    debug!(client_id = credentials.client_id(), "token refreshed concurrently");
                    return Ok(Some(token));
                }
                let data = self.refresh_locked(credentials).await?;
                Ok(Some(data.access_token))
            }
        }
    }

    /// Refresh the access token of `credentials` in place.
    ///
    /// Access token, refresh token and expiry are replaced together, then
    /// every refresh listener runs once with the new snapshot, which is also
    /// returned. Fails with `Unauthenticated` and sends nothing when the
    /// credentials hold no refresh token.
    pub async fn refresh(&self, credentials: &Credentials) -> Result<TokenData> {
        let _gate = credentials.lock_refresh().await;
        self.refresh_locked(credentials).await
    }

    /// Caller must hold the credentials' refresh gate.
    async fn refresh_locked(&self, credentials: &Credentials) -> Result<TokenData> {
        let refresh_token = credentials.refresh_token().await?;
        let params = Params::new()
            .with("grant_type", "refresh_token")
            .with("client_id", credentials.client_id())
            .with("client_secret", credentials.client_secret())
            .with("refresh_token", refresh_token);

        let body = match self.send(Action::RequestToken, &params, None).await {
            Ok(body) => body,
            Err(e) => {
                counter!("withings_token_refresh_total", "outcome" => "failure").increment(1);
                warn!(client_id = credentials.client_id(), error = %e, "token refresh failed");
                return Err(e);
            }
        };
        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|e| Error::Decode(format!("invalid refresh response: {e}")))?;

        let expires = token.expires_at(now_millis());
        let snapshot = credentials
            .apply_refresh(token.access_token, token.refresh_token, expires)
            .await;
        counter!("withings_token_refresh_total", "outcome" => "success").increment(1);
        info!(client_id = credentials.client_id(), expires, "token refresh succeeded");

        credentials.notify(&snapshot).await;
        Ok(snapshot)
    }

    /// Exchange an authorization code for a brand-new set of credentials.
    ///
    /// This is the last step of the authorization-code flow: the user approved
    /// access in the browser and Withings redirected back with `code`. No
    /// existing `Credentials` instance is touched.
    pub async fn exchange_authorization_code(
        &self,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<Credentials> {
        let params = Params::new()
            .with("grant_type", "authorization_code")
            .with("client_id", client_id)
            .with("client_secret", client_secret)
            .with("code", code)
            .with("redirect_uri", redirect_uri);

        let token: TokenResponse = self
            .call_as(Action::RequestToken, params, None)
            .await
            .map_err(|e| match e {
                Error::Decode(msg) => Error::Decode(format!("invalid token response: {msg}")),
                other => other,
            })?;

        let expires = token.expires_at(now_millis());
        info!(client_id, user_id = token.user_id.as_deref(), "authorization code exchanged");

        Ok(Credentials::from_token_data(
            client_id,
            client_secret,
            TokenData {
                user_id: token.user_id,
                access_token: token.access_token,
                refresh_token: Some(token.refresh_token),
                expires,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{ListenerError, RefreshListener};
    use crate::test_support::{MockApi, far_future, token_reply};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn credentials(expires: u64) -> Credentials {
        Credentials::from_token_data(
            "cid",
            "csecret",
            TokenData {
                user_id: Some("363".into()),
                access_token: "at_old".into(),
                refresh_token: Some("rt_old".into()),
                expires,
            },
        )
    }

    /// Mock whose token endpoint hands out `at_1`, `at_2`, ... and whose other
    /// services answer with an empty body.
    async fn rotating_mock() -> MockApi {
        let issued = AtomicUsize::new(0);
        MockApi::start(move |request| {
            if request.path == "/oauth2" {
                let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
                token_reply(&format!("at_{n}"), &format!("rt_{n}"), 3600)
            } else {
                json!({"status": 0, "body": {}})
            }
        })
        .await
    }

    #[test]
    fn token_response_deserializes() {
        let json = r#"{"userid":"363","access_token":"at_abc","refresh_token":"rt_def","expires_in":10800,"scope":"user.info","token_type":"Bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.user_id.as_deref(), Some("363"));
        assert_eq!(token.access_token, "at_abc");
        assert_eq!(token.refresh_token, "rt_def");
        assert_eq!(token.expires_in, 10800);
    }

    #[test]
    fn numeric_user_id_is_accepted() {
        let json = r#"{"userid":363,"access_token":"a","refresh_token":"r","expires_in":1}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.user_id.as_deref(), Some("363"));

        let json = r#"{"access_token":"a","refresh_token":"r","expires_in":1}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(token.user_id.is_none());
    }

    #[test]
    fn expires_at_converts_seconds_to_absolute_millis() {
        let token = TokenResponse {
            user_id: None,
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_in: 3600,
        };
        assert_eq!(token.expires_at(1_000), 3_601_000);
    }

    #[tokio::test]
    async fn fresh_token_resolves_without_network() {
        let mock = rotating_mock().await;
        let creds = credentials(far_future());

        let token = mock.client().resolve_bearer_token(&creds).await.unwrap();

        assert_eq!(token.as_deref(), Some("at_old"));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_token_resolves_to_none() {
        let mock = rotating_mock().await;
        let creds = Credentials::new("cid", "csecret");

        let token = mock.client().resolve_bearer_token(&creds).await.unwrap();

        assert!(token.is_none());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn expired_token_triggers_exactly_one_refresh() {
        let mock = rotating_mock().await;
        let creds = credentials(1);
        let before = now_millis();

        let token = mock.client().resolve_bearer_token(&creds).await.unwrap();

        assert_eq!(token.as_deref(), Some("at_1"));
        assert_eq!(mock.count("/oauth2"), 1);

        let data = creds.to_token_data().await.unwrap();
        assert_eq!(data.access_token, "at_1");
        assert_eq!(data.refresh_token.as_deref(), Some("rt_1"));
        assert!(data.expires >= before + 3_600_000);
        assert_eq!(data.user_id.as_deref(), Some("363"));
    }

    #[tokio::test]
    async fn refresh_sends_refresh_grant() {
        let mock = rotating_mock().await;
        let creds = credentials(1);

        mock.client().refresh(&creds).await.unwrap();

        let requests = mock.requests();
        let form = &requests[0].form;
        assert_eq!(requests[0].path, "/oauth2");
        assert!(requests[0].authorization.is_none());
        assert_eq!(form["action"], "requesttoken");
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["client_id"], "cid");
        assert_eq!(form["client_secret"], "csecret");
        assert_eq!(form["refresh_token"], "rt_old");
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_sends_nothing() {
        let mock = rotating_mock().await;
        let creds = Credentials::from_token_data(
            "cid",
            "csecret",
            TokenData {
                user_id: None,
                access_token: "at_old".into(),
                refresh_token: None,
                expires: 1,
            },
        );

        let result = mock.client().refresh(&creds).await;

        assert!(matches!(result, Err(Error::Unauthenticated(_))));
        assert!(mock.requests().is_empty());

        // Resolution of the stale token fails the same way.
        let result = mock.client().resolve_bearer_token(&creds).await;
        assert!(matches!(result, Err(Error::Unauthenticated(_))));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn refresh_of_unauthenticated_credentials_fails() {
        let mock = rotating_mock().await;
        let creds = Credentials::new("cid", "csecret");

        let result = mock.client().refresh(&creds).await;

        assert!(matches!(result, Err(Error::Unauthenticated(_))));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn listeners_see_the_complete_update_once_in_order() {
        let mock = rotating_mock().await;
        let creds = credentials(1);
        let seen: Arc<Mutex<Vec<(&'static str, TokenData)>>> = Arc::new(Mutex::new(Vec::new()));

        for name in ["persist", "audit"] {
            let seen = seen.clone();
            let listener: RefreshListener =
                Arc::new(move |data: &TokenData| -> std::result::Result<(), ListenerError> {
                    seen.lock().unwrap().push((name, data.clone()));
                    Ok(())
                });
            creds.on(listener).await;
        }

        let snapshot = mock.client().refresh(&creds).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "persist");
        assert_eq!(seen[1].0, "audit");
        for (_, data) in seen.iter() {
            assert_eq!(data, &snapshot);
            assert_eq!(data.access_token, "at_1");
            assert_eq!(data.refresh_token.as_deref(), Some("rt_1"));
        }
    }

    #[tokio::test]
    async fn duplicate_listener_runs_once_per_refresh() {
        let mock = rotating_mock().await;
        let creds = credentials(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener: RefreshListener =
            Arc::new(move |_: &TokenData| -> std::result::Result<(), ListenerError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        creds.on(listener.clone()).await;
        creds.on(listener).await;
        mock.client().refresh(&creds).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_listener_does_not_fail_refresh() {
        let mock = rotating_mock().await;
        let creds = credentials(1);
        let failing: RefreshListener =
            Arc::new(|_: &TokenData| -> std::result::Result<(), ListenerError> {
                Err("cannot persist".into())
            });
        creds.on(failing).await;

        let snapshot = mock.client().refresh(&creds).await.unwrap();
        assert_eq!(snapshot.access_token, "at_1");
    }

    #[tokio::test]
    async fn rejected_refresh_leaves_credentials_untouched() {
        let mock =
            MockApi::start(|_| json!({"status": 401, "error": "invalid refresh_token"})).await;
        let creds = credentials(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        creds
            .on(Arc::new(move |_: &TokenData| -> std::result::Result<(), ListenerError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .await;

        let err = mock.client().refresh(&creds).await.unwrap_err();

        assert!(matches!(err, Error::Api(ref api) if api.status == 401), "got: {err:?}");
        let data = creds.to_token_data().await.unwrap();
        assert_eq!(data.access_token, "at_old");
        assert_eq!(data.refresh_token.as_deref(), Some("rt_old"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_on_expired_credentials_share_one_refresh() {
        let mock = rotating_mock().await;
        let client = mock.client();
        let creds = credentials(1);

        let (a, b) = tokio::join!(
            client.call(Action::GetDevice, Params::new(), Some(&creds)),
            client.call(Action::GetGoals, Params::new(), Some(&creds)),
        );

        a.unwrap();
        b.unwrap();
        assert_eq!(mock.count("/oauth2"), 1);
        assert_eq!(mock.count("/user"), 2);
        for request in mock.requests().iter().filter(|r| r.path == "/user") {
            assert_eq!(request.authorization.as_deref(), Some("Bearer at_1"));
        }
        assert_eq!(creds.to_token_data().await.unwrap().access_token, "at_1");
    }

    #[tokio::test]
    async fn explicit_refreshes_replace_tokens_each_time() {
        let mock = rotating_mock().await;
        let client = mock.client();
        let creds = credentials(far_future());

        client.refresh(&creds).await.unwrap();
        let last = client.refresh(&creds).await.unwrap();

        assert_eq!(last.access_token, "at_2");
        assert_eq!(creds.to_token_data().await.unwrap(), last);
        assert_eq!(mock.count("/oauth2"), 2);
    }

    #[tokio::test]
    async fn code_exchange_builds_new_credentials() {
        let mock = rotating_mock().await;

        let creds = mock
            .client()
            .exchange_authorization_code("cid", "csecret", "https://cb", "code-123")
            .await
            .unwrap();

        let requests = mock.requests();
        let form = &requests[0].form;
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "code-123");
        assert_eq!(form["redirect_uri"], "https://cb");
        assert_eq!(form["client_secret"], "csecret");
        assert!(requests[0].authorization.is_none());

        assert_eq!(creds.client_id(), "cid");
        assert_eq!(creds.user_id().await.as_deref(), Some("42"));
        let data = creds.to_token_data().await.unwrap();
        assert_eq!(data.access_token, "at_1");
        assert!(data.expires > now_millis());
    }

    #[tokio::test]
    async fn rejected_code_exchange_is_api_error() {
        let mock = MockApi::start(|_| json!({"status": 503, "error": "Invalid Params"})).await;

        let result = mock
            .client()
            .exchange_authorization_code("cid", "csecret", "https://cb", "bad")
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Api(_)), "got: {err:?}");
        assert!(err.to_string().contains("/oauth2 with action requesttoken"));
    }
}
