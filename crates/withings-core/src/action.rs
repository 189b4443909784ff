//! Services and actions understood by the dispatcher
//!
//! Withings exposes one POST endpoint per service (`/user`, `/measure`, ...)
//! and selects the operation with an `action` form field. Each [`Action`]
//! knows its service, so a call can never pair an action with the wrong path.

use std::fmt;

/// API service, i.e. the path segment below the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    OAuth2,
    User,
    Measure,
    Notify,
}

impl Service {
    pub fn as_str(self) -> &'static str {
        match self {
            Service::OAuth2 => "oauth2",
            Service::User => "user",
            Service::Measure => "measure",
            Service::Notify => "notify",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// `oauth2/requesttoken`: code exchange and refresh
    RequestToken,
    GetDevice,
    GetGoals,
    GetMeas,
    NotifyGet,
    NotifyList,
    NotifyRevoke,
    NotifySubscribe,
    NotifyUpdate,
}

impl Action {
    pub fn service(self) -> Service {
        match self {
            Action::RequestToken => Service::OAuth2,
            Action::GetDevice | Action::GetGoals => Service::User,
            Action::GetMeas => Service::Measure,
            Action::NotifyGet
            | Action::NotifyList
            | Action::NotifyRevoke
            | Action::NotifySubscribe
            | Action::NotifyUpdate => Service::Notify,
        }
    }

    /// Value of the `action` form field.
    pub fn name(self) -> &'static str {
        match self {
            Action::RequestToken => "requesttoken",
            Action::GetDevice => "getdevice",
            Action::GetGoals => "getgoals",
            Action::GetMeas => "getmeas",
            Action::NotifyGet => "get",
            Action::NotifyList => "list",
            Action::NotifyRevoke => "revoke",
            Action::NotifySubscribe => "subscribe",
            Action::NotifyUpdate => "update",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
