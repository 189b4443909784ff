//! `notify` service: webhook subscriptions
//!
//! Withings calls `callbackurl` whenever new data of the subscribed
//! application category (`appli`: 1 = weight, 4 = heart, 16 = activity, ...)
//! arrives for the user.

use serde::{Deserialize, Serialize};
use withings_core::{Action, Params, Result};

use crate::Withings;

/// A notification subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub appli: u32,
    #[serde(rename = "callbackurl")]
    pub callback_url: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A subscription as returned by `list`, with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationProfile {
    #[serde(flatten)]
    pub notification: Notification,
    /// Unix seconds after which Withings drops the subscription
    #[serde(default)]
    pub expires: Option<i64>,
}

/// What an `update` call changes on an existing subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyChange {
    CallbackUrl(String),
    Appli(u32),
    Comment(String),
}

impl NotifyChange {
    fn apply(&self, params: Params) -> Params {
        match self {
            NotifyChange::CallbackUrl(url) => params.with("new_callbackurl", url.as_str()),
            NotifyChange::Appli(appli) => params.with("new_appli", *appli),
            NotifyChange::Comment(comment) => params.with("comment", comment.as_str()),
        }
    }
}

#[derive(Deserialize)]
struct ProfilesBody {
    #[serde(default)]
    profiles: Vec<NotificationProfile>,
}

/// View on the `notify` service.
#[derive(Debug, Clone, Copy)]
pub struct NotifyApi<'a> {
    session: &'a Withings,
}

impl<'a> NotifyApi<'a> {
    pub(crate) fn new(session: &'a Withings) -> Self {
        Self { session }
    }

    /// Look up the subscription for `callback_url`.
    pub async fn get(&self, callback_url: &str, appli: Option<u32>) -> Result<Notification> {
        let params = Params::new()
            .with("callbackurl", callback_url)
            .with("appli", appli);
        self.session.call(Action::NotifyGet, params).await
    }

    /// All subscriptions, optionally restricted to one application category.
    pub async fn list(&self, appli: Option<u32>) -> Result<Vec<NotificationProfile>> {
        let body: ProfilesBody = self
            .session
            .call(Action::NotifyList, Params::new().with("appli", appli))
            .await?;
        Ok(body.profiles)
    }

    /// Remove subscriptions matching the given URL and/or category.
    pub async fn revoke(&self, callback_url: Option<&str>, appli: Option<u32>) -> Result<()> {
        let params = Params::new()
            .with("callbackurl", callback_url)
            .with("appli", appli);
        self.session.execute(Action::NotifyRevoke, params).await
    }

    pub async fn subscribe(
        &self,
        callback_url: &str,
        appli: u32,
        comment: Option<&str>,
    ) -> Result<()> {
        let params = Params::new()
            .with("callbackurl", callback_url)
            .with("appli", appli)
            .with("comment", comment);
        self.session.execute(Action::NotifySubscribe, params).await
    }

    /// Change the URL, category or comment of an existing subscription.
    pub async fn update(&self, callback_url: &str, appli: u32, change: &NotifyChange) -> Result<()> {
        let params = change.apply(
            Params::new()
                .with("callbackurl", callback_url)
                .with("appli", appli),
        );
        self.session.execute(Action::NotifyUpdate, params).await
    }
}
