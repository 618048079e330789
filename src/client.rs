// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP client shared by the login and fetch stages.
//!
//! The stage-specific calls live next to their parsing code:
//! [`crate::auth`] for the credential exchange and login,
//! [`crate::fetch`] for the manifest and archive requests.

use anyhow::{Context, Result};

use crate::config::ServiceConfig;
use crate::error::{FetchError, Stage};

/// Client for the Huami account and asset endpoints.
#[derive(Debug, Clone)]
pub struct HuamiClient {
    /// Wire constants and endpoints.
    pub(crate) config: ServiceConfig,
    /// Follows redirects. Used for the manifest and archive GETs.
    pub(crate) http: reqwest::Client,
    /// Never follows redirects. The credential exchange reads the
    /// `Location` header itself, and login is sent the same way.
    pub(crate) http_no_redirect: reqwest::Client,
}

impl HuamiClient {
    /// Create a client against the production endpoints.
    pub fn new() -> Result<Self> {
        Self::with_config(ServiceConfig::default())
    }

    /// Create a client with a specific configuration.
    pub fn with_config(config: ServiceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let http_no_redirect = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http,
            http_no_redirect,
        })
    }

    /// The configuration this client sends.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

/// Map a transport error to a [`FetchError::Network`] for `stage`.
pub(crate) fn network_error(stage: Stage, err: reqwest::Error) -> FetchError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("failed to connect: {}", err)
    } else {
        err.to_string()
    };
    FetchError::Network { stage, message }
}
