// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical types passed between the login and fetch stages.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::mask_sensitive;

/// Email/password pair supplied on the command line. Never persisted.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Values pulled out of the registration redirect, consumed by login.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// Short-lived opaque access code.
    pub access_code: String,
    /// Country code the account is registered in.
    pub country_code: String,
}

impl fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGrant")
            .field("access_code", &mask_sensitive(&self.access_code, 4))
            .field("country_code", &self.country_code)
            .finish()
    }
}

/// Authenticated context returned by the login endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Account user id, sent as the `userid` query parameter.
    pub user_id: String,
    /// Application token, sent as the `apptoken` header.
    pub app_token: String,
    /// Long-lived login token, when the service hands one out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_token: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("app_token", &mask_sensitive(&self.app_token, 6))
            .field("login_token", &self.login_token.as_deref().map(|t| mask_sensitive(t, 6)))
            .finish()
    }
}

/// Asset manifest returned by the caller-supplied URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Download location of the referenced asset.
    pub url: String,
}

impl Manifest {
    /// Candidate download URLs. The service only ever returns one.
    pub fn candidates(&self) -> Vec<&str> {
        vec![self.url.as_str()]
    }
}

/// What happened to a single candidate URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Archive written to disk.
    Saved { url: String, path: PathBuf, bytes: u64 },
    /// Archive GET answered with something other than 200.
    Failed { url: String, status: u16 },
    /// Candidate does not point at a `.zip` archive; nothing requested.
    NotAnArchive { url: String },
}

impl DownloadOutcome {
    /// Returns true if a file was written.
    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved { .. })
    }
}
