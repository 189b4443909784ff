//! Withings endpoint constants
//!
//! The API base and the browser authorization page. Client identity is not
//! baked in: every application registers its own client id and secret.

/// Base URL of the Withings v2 API. Each service is a path segment below it.
pub const BASE_URL: &str = "https://wbsapi.withings.net/v2";

/// Browser authorization page for the OAuth2 authorization-code flow.
pub const AUTHORIZE_ENDPOINT: &str = "https://account.withings.com/oauth2_user/authorize2";

/// `response_type` sent on the authorization URL.
pub const RESPONSE_TYPE: &str = "code";

/// Value of the `mode` parameter that opens the demo account instead of a
/// real user's data.
pub const DEMO_MODE: &str = "demo";
