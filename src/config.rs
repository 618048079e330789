// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fixed service configuration.
//!
//! Every value the Huami account service expects on the wire lives in one
//! immutable [`ServiceConfig`]. Field names and values are sent verbatim, so
//! changing any of them changes what the remote side sees.

use std::time::Duration;

/// Default account-registration host.
pub const DEFAULT_REGISTRATION_BASE: &str = "https://api-user.huami.com";

/// Default session login endpoint.
pub const DEFAULT_LOGIN_URL: &str = "https://account.huami.com/v2/client/login";

/// Redirect target registered for the `HuaMi` client id.
pub const DEFAULT_REDIRECT_URI: &str =
    "https://s3-us-west-2.amazonws.com/hm-registration/successsignin.html";

/// Domain list announced by the Android app at login.
pub const DEFAULT_DOMAIN_LIST: &str = "account.huami.com,api-user.huami.com,api-watch.huami.com,api-analytics.huami.com,app-analytics.huami.com,api-mifit.huami.com";

/// Connect timeout for every request (in seconds).
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Device and application identity presented to the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// `app_name` form field.
    pub app_name: String,
    /// `dn` form field.
    pub domain_list: String,
    /// `device_id` form field.
    pub device_id: String,
    /// `device_model` form field.
    pub device_model: String,
    /// `app_version` form field.
    pub app_version: String,
    /// `allow_registration` form field.
    pub allow_registration: bool,
    /// `third_name` form field.
    pub third_name: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            app_name: "com.xiaomi.hm.health".to_string(),
            domain_list: DEFAULT_DOMAIN_LIST.to_string(),
            device_id: "02:00:00:00:00:00".to_string(),
            device_model: "android_phone".to_string(),
            app_version: "4.0.9".to_string(),
            allow_registration: false,
            third_name: "huami".to_string(),
        }
    }
}

impl DeviceProfile {
    /// Form fields in the order the login endpoint receives them.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("app_name", self.app_name.clone()),
            ("dn", self.domain_list.clone()),
            ("device_id", self.device_id.clone()),
            ("device_model", self.device_model.clone()),
            ("app_version", self.app_version.clone()),
            ("allow_registration", self.allow_registration.to_string()),
            ("third_name", self.third_name.clone()),
        ]
    }
}

/// Immutable configuration shared by every network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Base URL of the account-registration service (no trailing slash).
    pub registration_base: String,
    /// Full URL of the session login endpoint.
    pub login_url: String,
    /// `client_id` sent with the credential exchange.
    pub client_id: String,
    /// `state` flag selecting the redirect-based token flow.
    pub state: String,
    /// `redirect_uri` sent with the credential exchange.
    pub redirect_uri: String,
    /// `token` flag asking for an access token in the redirect.
    pub token_kind: String,
    /// `grant_type` sent at login.
    pub grant_type: String,
    /// Device/app metadata sent at login.
    pub device: DeviceProfile,
    /// `device_type` query parameter on the manifest request.
    pub manifest_device_type: String,
    /// Connect timeout applied to the HTTP client.
    pub connect_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            registration_base: DEFAULT_REGISTRATION_BASE.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            client_id: "HuaMi".to_string(),
            state: "REDIRECTION".to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            token_kind: "access".to_string(),
            grant_type: "access_token".to_string(),
            device: DeviceProfile::default(),
            manifest_device_type: "android_phone".to_string(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ServiceConfig {
    /// Same wire values, different hosts. Used to point the client at a
    /// staging or mock server.
    pub fn with_hosts(registration_base: impl Into<String>, login_url: impl Into<String>) -> Self {
        Self {
            registration_base: registration_base.into().trim_end_matches('/').to_string(),
            login_url: login_url.into(),
            ..Self::default()
        }
    }

    /// Registration endpoint for `email`, with the email percent-encoded as a
    /// single path segment.
    pub fn registration_url(&self, email: &str) -> String {
        format!(
            "{}/registrations/{}/tokens",
            self.registration_base,
            urlencoding::encode(email)
        )
    }
}
