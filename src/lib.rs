// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! mifit-fetch - Huami / Mi Fit watch-face downloader
//!
//! Logs in to a Huami account with email and password, then fetches a
//! watch-face manifest and downloads the archive it points at:
//!
//! **Credential exchange** -> **Session login** -> **Asset fetch**
//!
//! # Core Modules
//!
//! - [`config`] - Fixed endpoints and device metadata sent on the wire
//! - [`auth`] - Credential exchange and session login
//! - [`fetch`] - Manifest lookup and archive download
//! - [`summary`] - Optional per-day activity summary decoding
//! - [`workflow`] - The linear run tying the stages together
//! - [`error`] - Error taxonomy and exit codes
//!
//! # Example
//!
//! ```no_run
//! use mifit_fetch::{run, Credentials, FetchMode, FetchRequest, HuamiClient};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = HuamiClient::new()?;
//! let request = FetchRequest {
//!     credentials: Credentials::new("me@example.com", "secret"),
//!     url: "https://api-mifit.huami.com/market/devices/watchfaces/123".to_string(),
//!     output_dir: ".".into(),
//!     mode: FetchMode::Download,
//! };
//! let report = run(&client, &request, |event| println!("{:?}", event)).await?;
//! println!("{} archive(s) saved", report.saved_count());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod summary;
pub mod types;
pub mod utils;
pub mod workflow;

pub use client::HuamiClient;
pub use config::{DeviceProfile, ServiceConfig};
pub use error::{exit_code_for, exit_codes, FetchError, Stage};
pub use types::{AccessGrant, Credentials, DownloadOutcome, Manifest, Session};
pub use utils::mask_sensitive;
pub use workflow::{run, Event, FetchMode, FetchRequest, RunReport};
