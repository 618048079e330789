// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Credential exchange and session login.
//!
//! Logging in is two requests:
//!
//! 1. `POST {registration}/registrations/{email}/tokens` with the password.
//!    The service answers with a redirect whose query string carries an
//!    `access` code and a `country_code`.
//! 2. `POST {login_url}` with that code plus the fixed device metadata. The
//!    JSON body carries `token_info.user_id` and `token_info.app_token`.

use anyhow::Result;
use serde_json::Value;

use crate::client::{network_error, HuamiClient};
use crate::error::{FetchError, Stage};
use crate::types::{AccessGrant, Credentials, Session};
use crate::utils::mask_sensitive;

impl HuamiClient {
    /// Trade an email and password for an [`AccessGrant`].
    ///
    /// Redirects are not followed. A 4xx/5xx answer is an error; any other
    /// status is accepted as long as the `Location` header carries both
    /// parameters.
    pub async fn exchange_credentials(&self, credentials: &Credentials) -> Result<AccessGrant> {
        let url = self.config.registration_url(&credentials.email);
        tracing::debug!("Posting credentials for {} to {}", credentials.email, url);

        let form = [
            ("state", self.config.state.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("token", self.config.token_kind.as_str()),
            ("password", credentials.password.as_str()),
        ];

        let response = self
            .http_no_redirect
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| network_error(Stage::CredentialExchange, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::HttpStatus {
                stage: Stage::CredentialExchange,
                status: status.as_u16(),
            }
            .into());
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        tracing::debug!("Registration answered HTTP {}", status);

        let grant = parse_redirect(location)?;
        tracing::info!(
            "Obtained access code {} for country {}",
            mask_sensitive(&grant.access_code, 4),
            grant.country_code
        );
        Ok(grant)
    }

    /// Exchange an [`AccessGrant`] for a [`Session`].
    ///
    /// The body is checked for `token_info.user_id` and
    /// `token_info.app_token`; anything else is a
    /// [`FetchError::MalformedSession`].
    pub async fn login(&self, grant: &AccessGrant) -> Result<Session> {
        let form = self.login_form(grant);

        let response = self
            .http_no_redirect
            .post(&self.config.login_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| network_error(Stage::SessionLogin, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| network_error(Stage::SessionLogin, e))?;

        let json: Value = serde_json::from_str(&body).map_err(|_| {
            FetchError::MalformedSession(format!("HTTP {} with a non-JSON body", status.as_u16()))
        })?;

        let session = session_from_login(&json)?;
        tracing::info!(
            "Session established for user {} (app token {})",
            session.user_id,
            mask_sensitive(&session.app_token, 6)
        );
        Ok(session)
    }

    /// Form fields for the login request: device metadata followed by the
    /// grant.
    pub fn login_form(&self, grant: &AccessGrant) -> Vec<(&'static str, String)> {
        let mut form = self.config.device.form_fields();
        form.push(("grant_type", self.config.grant_type.clone()));
        form.push(("country_code", grant.country_code.clone()));
        form.push(("code", grant.access_code.clone()));
        form
    }

    /// Run both login requests.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        let grant = self.exchange_credentials(credentials).await?;
        self.login(&grant).await
    }
}

/// Pull the access code and country code out of a redirect target.
///
/// Accepts absolute or relative targets. Blank values count as missing and
/// the first of repeated keys wins.
pub fn parse_redirect(location: &str) -> Result<AccessGrant, FetchError> {
    let without_fragment = location.split('#').next().unwrap_or_default();
    let query = without_fragment
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or_default();

    let mut access_code = None;
    let mut country_code = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "access" if access_code.is_none() => access_code = Some(value.into_owned()),
            "country_code" if country_code.is_none() => country_code = Some(value.into_owned()),
            _ => {}
        }
    }

    let access_code = access_code.ok_or(FetchError::MissingAccessToken)?;
    let country_code = country_code.ok_or(FetchError::MissingCountryCode)?;
    Ok(AccessGrant {
        access_code,
        country_code,
    })
}

/// Validate a login body and turn it into a [`Session`].
pub fn session_from_login(body: &Value) -> Result<Session, FetchError> {
    let Some(token_info) = body.get("token_info").filter(|v| v.is_object()) else {
        return Err(FetchError::MalformedSession(describe_login_failure(body)));
    };

    let user_id = match token_info.get("user_id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(FetchError::MalformedSession(
                "token_info.user_id missing".to_string(),
            ))
        }
    };

    let app_token = token_info
        .get("app_token")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| FetchError::MalformedSession("token_info.app_token missing".to_string()))?
        .to_string();

    let login_token = token_info
        .get("login_token")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Session {
        user_id,
        app_token,
        login_token,
    })
}

/// Summarize whatever error fields the service put in a body without
/// `token_info`.
fn describe_login_failure(body: &Value) -> String {
    let mut parts = Vec::new();
    for key in ["error_code", "result", "message"] {
        match body.get(key) {
            Some(Value::String(s)) => parts.push(format!("{}={}", key, s)),
            Some(Value::Number(n)) => parts.push(format!("{}={}", key, n)),
            _ => {}
        }
    }

    if parts.is_empty() {
        "token_info missing".to_string()
    } else {
        format!("token_info missing ({})", parts.join(", "))
    }
}
