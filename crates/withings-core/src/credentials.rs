//! In-memory OAuth credentials for one Withings user
//!
//! A `Credentials` value is shared (usually behind an `Arc`) by every API
//! wrapper acting for the same user. Token refresh mutates it in place so all
//! holders see the new token, then tells the registered listeners so the host
//! application can persist the new token data. The library itself never
//! writes tokens anywhere.
//!
//! `expires` is a unix timestamp in milliseconds (absolute, not a delta),
//! computed from the token endpoint's `expires_in` (seconds) at refresh time.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::secret::Secret;

/// Error a refresh listener may report. It is logged and otherwise ignored.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback run after every successful token refresh.
///
/// Identity is the `Arc` allocation: registering a clone of the same `Arc`
/// replaces the earlier registration. Listeners run synchronously on the
/// refreshing task; anything slow should be handed off (channel, spawned
/// task) rather than done inline.
pub type RefreshListener = Arc<dyn Fn(&TokenData) -> std::result::Result<(), ListenerError> + Send + Sync>;

/// Serializable token state, for persisting credentials across restarts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    /// Withings user id, when the code exchange returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiration as unix timestamp in milliseconds
    pub expires: u64,
}

impl fmt::Debug for TokenData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenData")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires", &self.expires)
            .finish()
    }
}

/// Token fields that are always replaced together.
struct Tokens {
    user_id: Option<String>,
    access: Secret,
    refresh: Option<Secret>,
    expires: u64,
}

impl Tokens {
    fn from_data(data: TokenData) -> Self {
        Self {
            user_id: data.user_id,
            access: Secret::new(data.access_token),
            refresh: data.refresh_token.map(Secret::new),
            expires: data.expires,
        }
    }

    fn to_data(&self) -> TokenData {
        TokenData {
            user_id: self.user_id.clone(),
            access_token: self.access.expose().clone(),
            refresh_token: self.refresh.as_ref().map(|r| r.expose().clone()),
            expires: self.expires,
        }
    }
}

/// Validity of the current access token at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenStatus {
    /// Never authenticated; calls go out without a bearer token.
    Missing,
    Fresh(String),
    Stale,
}

/// OAuth credentials of one user of one Withings application.
pub struct Credentials {
    client_id: String,
    client_secret: Secret,
    tokens: RwLock<Option<Tokens>>,
    listeners: Mutex<Vec<RefreshListener>>,
    /// Serializes refreshes of this instance so concurrent callers that see
    /// the same stale token share one refresh.
    refresh_gate: Mutex<()>,
}

impl Credentials {
    /// Unauthenticated credentials: only the application identity is known.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<Secret>) -> Self {
        Self::with_tokens(client_id.into(), client_secret.into(), None)
    }

    /// Rehydrate credentials from previously persisted token data.
    pub fn from_token_data(
        client_id: impl Into<String>,
        client_secret: impl Into<Secret>,
        data: TokenData,
    ) -> Self {
        Self::with_tokens(
            client_id.into(),
            client_secret.into(),
            Some(Tokens::from_data(data)),
        )
    }

    fn with_tokens(client_id: String, client_secret: Secret, tokens: Option<Tokens>) -> Self {
        Self {
            client_id,
            client_secret,
            tokens: RwLock::new(tokens),
            listeners: Mutex::new(Vec::new()),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn client_secret(&self) -> &str {
        self.client_secret.expose()
    }

    pub async fn user_id(&self) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens.as_ref().and_then(|t| t.user_id.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    /// Snapshot of the token state, or `None` if never authenticated.
    pub async fn to_token_data(&self) -> Option<TokenData> {
        let tokens = self.tokens.read().await;
        tokens.as_ref().map(Tokens::to_data)
    }

    /// A token is stale once `expires` lies before `now_millis`.
    pub(crate) async fn status_at(&self, now_millis: u64) -> TokenStatus {
        let tokens = self.tokens.read().await;
        match tokens.as_ref() {
            None => TokenStatus::Missing,
            Some(t) if t.expires < now_millis => TokenStatus::Stale,
            Some(t) => TokenStatus::Fresh(t.access.expose().clone()),
        }
    }

    /// Refresh token to present to the token endpoint.
    ///
    /// Fails with `Unauthenticated` when there is no access token or no
    /// refresh token, before anything is sent.
    pub(crate) async fn refresh_token(&self) -> Result<String> {
        let tokens = self.tokens.read().await;
        let tokens = tokens.as_ref().ok_or_else(|| {
            Error::Unauthenticated(format!(
                "client {} has no access token to refresh",
                self.client_id
            ))
        })?;
        tokens
            .refresh
            .as_ref()
            .map(|r| r.expose().clone())
            .ok_or_else(|| {
                Error::Unauthenticated(format!("client {} has no refresh token", self.client_id))
            })
    }

    /// Replace access token, refresh token and expiry under one write lock.
    ///
    /// The user id is kept. Returns the updated snapshot.
    pub(crate) async fn apply_refresh(
        &self,
        access: String,
        refresh: String,
        expires: u64,
    ) -> TokenData {
        let mut tokens = self.tokens.write().await;
        let user_id = tokens.as_ref().and_then(|t| t.user_id.clone());
        let updated = Tokens {
            user_id,
            access: Secret::new(access),
            refresh: Some(Secret::new(refresh)),
            expires,
        };
        let snapshot = updated.to_data();
        *tokens = Some(updated);
        debug!(client_id = %self.client_id, expires, "replaced tokens");
        snapshot
    }

    pub(crate) async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_gate.lock().await
    }

    /// Register a refresh listener.
    ///
    /// Registering an `Arc` that is already present replaces it in place, so
    /// it keeps its position and still runs once per refresh.
    pub async fn on(&self, listener: RefreshListener) {
        let mut listeners = self.listeners.lock().await;
        match listeners.iter_mut().find(|l| same_listener(l, &listener)) {
            Some(existing) => *existing = listener,
            None => listeners.push(listener),
        }
    }

    /// Remove a refresh listener. Unknown listeners are ignored.
    pub async fn off(&self, listener: &RefreshListener) {
        let mut listeners = self.listeners.lock().await;
        listeners.retain(|l| !same_listener(l, listener));
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }

    /// Run every listener once, in registration order.
    ///
    /// The list is cloned first so listeners may call `on`/`off` without
    /// deadlocking. A failing listener is logged and the rest still run.
    pub(crate) async fn notify(&self, snapshot: &TokenData) {
        let listeners = self.listeners.lock().await.clone();
        for (index, listener) in listeners.iter().enumerate() {
            if let Err(e) = listener(snapshot) {
                warn!(
                    client_id = %self.client_id,
                    listener = index,
                    error = %e,
                    "refresh listener failed"
                );
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .finish_non_exhaustive()
    }
}

fn same_listener(a: &RefreshListener, b: &RefreshListener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Current wall-clock time as unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
