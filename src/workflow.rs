// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The linear run: credential exchange, session login, asset fetch.
//!
//! ```text
//! Unauthenticated -> HaveAccessCode -> HaveSession -> Downloaded | Skipped
//! ```
//!
//! Each step runs once and only after the previous one succeeded. Progress
//! is reported through a callback so the CLI can print while the library
//! stays silent.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::client::HuamiClient;
use crate::summary::DaySummary;
use crate::types::{Credentials, DownloadOutcome, Session};

/// What to do with the response of the `--url` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Treat it as a manifest and download the referenced archive.
    #[default]
    Download,
    /// Treat it as band data and decode the per-day activity summaries.
    Summary,
}

/// Input to a run.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub credentials: Credentials,
    /// Manifest (or band-data) URL.
    pub url: String,
    /// Directory archives are written to.
    pub output_dir: PathBuf,
    pub mode: FetchMode,
}

/// Progress notifications, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    LoggingIn { email: String },
    ObtainedAccessToken,
    SessionEstablished { user_id: String },
    Retrieving { url: String },
    /// Status of the `--url` request.
    Response { status: u16 },
    Download(DownloadOutcome),
    Day(DaySummary),
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub session: Session,
    /// Status of the `--url` request.
    pub status: u16,
    pub downloads: Vec<DownloadOutcome>,
    pub days: Vec<DaySummary>,
}

impl RunReport {
    /// Number of archives written.
    pub fn saved_count(&self) -> usize {
        self.downloads.iter().filter(|d| d.is_saved()).count()
    }
}

/// Run the whole flow once.
pub async fn run<F>(client: &HuamiClient, request: &FetchRequest, mut on_event: F) -> Result<RunReport>
where
    F: FnMut(&Event),
{
    on_event(&Event::LoggingIn {
        email: request.credentials.email.clone(),
    });
    let grant = client
        .exchange_credentials(&request.credentials)
        .await
        .context("Credential exchange")?;
    on_event(&Event::ObtainedAccessToken);

    let session = client.login(&grant).await.context("Session login")?;
    on_event(&Event::SessionEstablished {
        user_id: session.user_id.clone(),
    });

    on_event(&Event::Retrieving {
        url: request.url.clone(),
    });
    let mut report = RunReport {
        session,
        status: 0,
        downloads: Vec::new(),
        days: Vec::new(),
    };

    match request.mode {
        FetchMode::Download => {
            let (status, manifest) = client
                .fetch_manifest(&report.session, &request.url)
                .await
                .context("Asset request")?;
            report.status = status.as_u16();
            on_event(&Event::Response { status: report.status });

            if let Some(manifest) = manifest {
                for outcome in client.download_manifest(&manifest, &request.output_dir).await? {
                    on_event(&Event::Download(outcome.clone()));
                    report.downloads.push(outcome);
                }
            }
        }
        FetchMode::Summary => {
            let (status, days) = client
                .fetch_activity(&report.session, &request.url)
                .await
                .context("Asset request")?;
            report.status = status.as_u16();
            on_event(&Event::Response { status: report.status });

            for day in days.unwrap_or_default() {
                on_event(&Event::Day(day.clone()));
                report.days.push(day);
            }
        }
    }

    Ok(report)
}
