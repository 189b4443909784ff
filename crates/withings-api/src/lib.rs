//! Typed Withings endpoint wrappers
//!
//! A [`Withings`] session pairs an `ApiClient` with the shared credentials of
//! one user and hands out per-service views:
//!
//! - [`Withings::user`]: devices and goals
//! - [`Withings::measure`]: body measures, single page or streamed
//! - [`Withings::notify`]: notification subscriptions
//!
//! Every call goes through the core dispatcher, so stale tokens are refreshed
//! transparently and refresh listeners fire as usual.

pub mod measure;
pub mod notify;
pub mod user;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use withings_core::{Action, ApiClient, Credentials, Params, Result};

pub use measure::{
    MeasureApi, MeasureCategory, MeasureGroup, MeasurePoint, MeasureQuery, MeasureResponse,
    MeasureTypes,
};
pub use notify::{Notification, NotificationProfile, NotifyApi, NotifyChange};
pub use user::{Device, DeviceType, Goals, UserApi, WeightGoal};

/// API session for one authenticated user.
#[derive(Debug, Clone)]
pub struct Withings {
    client: ApiClient,
    credentials: Arc<Credentials>,
}

impl Withings {
    pub fn new(client: ApiClient, credentials: Arc<Credentials>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Credentials shared with every call made through this session.
    pub fn credentials(&self) -> &Arc<Credentials> {
        &self.credentials
    }

    pub fn user(&self) -> UserApi<'_> {
        UserApi::new(self)
    }

    pub fn measure(&self) -> MeasureApi<'_> {
        MeasureApi::new(self)
    }

    pub fn notify(&self) -> NotifyApi<'_> {
        NotifyApi::new(self)
    }

    pub(crate) async fn call<T: DeserializeOwned>(&self, action: Action, params: Params) -> Result<T> {
        self.client
            .call_as(action, params, Some(self.credentials.as_ref()))
            .await
    }

    /// Call for its effect only; the body is ignored.
    pub(crate) async fn execute(&self, action: Action, params: Params) -> Result<()> {
        self.client
            .call(action, params, Some(self.credentials.as_ref()))
            .await
            .map(|_| ())
    }
}
