//! Withings API client core
//!
//! OAuth2 credentials with transparent token refresh, and the call
//! dispatcher every endpoint wrapper goes through. The typed endpoint
//! wrappers live in the `withings-api` crate.
//!
//! Credential flow:
//! 1. Host builds the browser redirect with `connect::connect_url()`
//! 2. User authorizes; host receives the code on its redirect URI
//! 3. Host calls `ApiClient::connect()` and gets fresh `Credentials`
//! 4. Host registers a refresh listener with `Credentials::on()` to persist
//!    `TokenData` whenever the token rotates
//! 5. Calls through `ApiClient::call()` refresh stale tokens in place
//! 6. On restart the host rehydrates with `Credentials::from_token_data()`

pub mod action;
pub mod client;
pub mod connect;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod secret;
pub mod token;

#[cfg(test)]
mod test_support;

pub use action::{Action, Service};
pub use client::{ApiClient, Params};
pub use connect::{ConnectConfig, ConnectUrl, ConnectUrlParams, Scope, connect_url};
pub use constants::*;
pub use credentials::{Credentials, ListenerError, RefreshListener, TokenData};
pub use error::{ApiError, ApiErrorData, Error, Result};
pub use secret::Secret;
pub use token::TokenResponse;
