// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy and formatting for mifit-fetch.
//!
//! [`FetchError`] covers every failure that ends the run. A failed archive
//! download is not one of them: it is reported as a
//! [`DownloadOutcome::Failed`](crate::types::DownloadOutcome) and the run
//! carries on.

use std::fmt;

/// Exit codes following sysexits.h conventions.
pub mod exit_codes {
    /// Operation completed (including "nothing to download").
    pub const SUCCESS: i32 = 0;
    /// General error, and the credential-exchange failures.
    pub const ERROR: i32 = 1;
    /// Remote service answered with data we cannot use.
    pub const DATA_ERR: i32 = 65;
    /// Remote service unreachable or refused the request.
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// Local file operation failed.
    pub const IO_ERR: i32 = 74;
}

/// Stage of the run an HTTP failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CredentialExchange,
    SessionLogin,
    Manifest,
    Archive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CredentialExchange => "credential exchange",
            Stage::SessionLogin => "session login",
            Stage::Manifest => "manifest request",
            Stage::Archive => "archive download",
        };
        f.write_str(name)
    }
}

/// Fatal errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Registration redirect carried no `access` parameter.
    MissingAccessToken,
    /// Registration redirect carried no `country_code` parameter.
    MissingCountryCode,
    /// Remote side answered with a failing HTTP status.
    HttpStatus { stage: Stage, status: u16 },
    /// Login body does not describe a session.
    MalformedSession(String),
    /// Manifest body has no usable `url`.
    MalformedManifest(String),
    /// Band-data body has no usable `data` array.
    MalformedActivity(String),
    /// Transport-level failure.
    Network { stage: Stage, message: String },
    /// Writing to the local filesystem failed.
    Io(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAccessToken => write!(f, "No access token in response"),
            Self::MissingCountryCode => write!(f, "No country_code in response"),
            Self::HttpStatus { stage, status } => {
                write!(f, "{} failed: HTTP {}", stage, status)
            }
            Self::MalformedSession(msg) => write!(f, "Unusable login response: {}", msg),
            Self::MalformedManifest(msg) => write!(f, "Unusable manifest: {}", msg),
            Self::MalformedActivity(msg) => write!(f, "Unusable activity data: {}", msg),
            Self::Network { stage, message } => {
                write!(f, "Network error during {}: {}", stage, message)
            }
            Self::Io(msg) => write!(f, "File error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingAccessToken | Self::MissingCountryCode => exit_codes::ERROR,
            Self::MalformedSession(_) | Self::MalformedManifest(_) | Self::MalformedActivity(_) => {
                exit_codes::DATA_ERR
            }
            Self::HttpStatus { .. } | Self::Network { .. } => exit_codes::SERVICE_UNAVAILABLE,
            Self::Io(_) => exit_codes::IO_ERR,
        }
    }

    /// Actionable guidance for the user, if any applies.
    pub fn help(&self) -> Option<String> {
        let builder = match self {
            Self::MissingAccessToken | Self::MissingCountryCode => {
                ErrorBuilder::new("Login was not accepted")
                    .cause("Wrong email or password")
                    .cause("Account registered through a third-party login")
                    .fix("Check the credentials by logging in to the Zepp / Mi Fit app")
            }
            Self::HttpStatus { stage: Stage::CredentialExchange, status } if *status == 429 => {
                ErrorBuilder::new("Too many login attempts")
                    .cause("The account service rate-limits repeated logins")
                    .fix("Wait a few minutes and try again")
            }
            Self::MalformedSession(_) => ErrorBuilder::new("Session could not be established")
                .cause("The access code expired before it was exchanged")
                .cause("The account service changed its response format")
                .fix("Run the command again"),
            Self::Network { .. } => ErrorBuilder::new("Service unreachable")
                .cause("No internet connection")
                .cause("Firewall or proxy blocking HTTPS")
                .fix("Check connectivity and retry"),
            _ => return None,
        };
        Some(builder.build())
    }
}

/// Extract the exit code for an error chain, defaulting to
/// [`exit_codes::ERROR`] when no [`FetchError`] is inside.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<FetchError>())
        .map(FetchError::exit_code)
        .unwrap_or(exit_codes::ERROR)
}

/// Formats an error message with title, causes and fixes.
///
/// # Example
///
/// ```
/// use mifit_fetch::error::format_error;
///
/// let error = format_error(
///     "Login was not accepted",
///     &["Wrong email or password"],
///     &["Check the credentials"],
/// );
/// assert!(error.contains("Possible causes:"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n", title);

    if !causes.is_empty() {
        output.push_str("\nPossible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
    }

    if !fixes.is_empty() {
        output.push_str("\nTry these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
    }

    output
}

/// Builder for constructing formatted error messages.
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    /// Create a new error builder with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    /// Add a possible cause.
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a suggested fix.
    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    /// Build the formatted error message.
    pub fn build(self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}
