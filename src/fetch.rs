// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Manifest lookup and archive download.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use fs2::FileExt;
use futures_util::StreamExt;
use reqwest::StatusCode;
use serde_json::Value;

use crate::client::{network_error, HuamiClient};
use crate::error::{FetchError, Stage};
use crate::summary::{decode_band_data, DaySummary};
use crate::types::{DownloadOutcome, Manifest, Session};

/// Extension a candidate must end in to be downloaded.
const ARCHIVE_EXTENSION: &str = ".zip";

impl HuamiClient {
    /// GET `url` with the session's credentials attached.
    ///
    /// Returns the status and raw body; the caller decides what a non-200
    /// means.
    pub async fn authorized_get(&self, session: &Session, url: &str) -> Result<(StatusCode, Vec<u8>)> {
        let response = self
            .http
            .get(url)
            .query(&[
                ("device_type", self.config.manifest_device_type.as_str()),
                ("userid", session.user_id.as_str()),
            ])
            .header("apptoken", &session.app_token)
            .send()
            .await
            .map_err(|e| network_error(Stage::Manifest, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(Stage::Manifest, e))?;
        Ok((status, body.to_vec()))
    }

    /// Authorized GET that only hands back a body on 200.
    ///
    /// Any other status is not an error: the caller gets the status and no
    /// body, and there is nothing further to do.
    pub async fn get_if_ok(&self, session: &Session, url: &str) -> Result<(StatusCode, Option<Vec<u8>>)> {
        let (status, body) = self.authorized_get(session, url).await?;
        if status != StatusCode::OK {
            tracing::debug!("{} answered HTTP {}, nothing to fetch", url, status);
            return Ok((status, None));
        }
        Ok((status, Some(body)))
    }

    /// Fetch the manifest at `url`.
    ///
    /// The manifest is `None` when the answer was not 200.
    pub async fn fetch_manifest(
        &self,
        session: &Session,
        url: &str,
    ) -> Result<(StatusCode, Option<Manifest>)> {
        let (status, body) = self.get_if_ok(session, url).await?;
        let manifest = body.map(|body| parse_manifest(&body)).transpose()?;
        if let Some(manifest) = &manifest {
            tracing::debug!("Manifest points at {}", manifest.url);
        }
        Ok((status, manifest))
    }

    /// Fetch and decode the per-day activity summaries at `url`.
    ///
    /// The days are `None` when the answer was not 200.
    pub async fn fetch_activity(
        &self,
        session: &Session,
        url: &str,
    ) -> Result<(StatusCode, Option<Vec<DaySummary>>)> {
        let (status, body) = self.get_if_ok(session, url).await?;
        let days = body.map(|body| decode_band_data(&body)).transpose()?;
        Ok((status, days))
    }

    /// Download every `.zip` candidate of `manifest` into `output_dir`, one
    /// after the other.
    pub async fn download_manifest(
        &self,
        manifest: &Manifest,
        output_dir: &Path,
    ) -> Result<Vec<DownloadOutcome>> {
        let mut outcomes = Vec::new();
        for url in manifest.candidates() {
            let outcome = match archive_file_name(url) {
                Some(name) => self.download_archive(url, &output_dir.join(name)).await?,
                None => {
                    tracing::debug!("Skipping {}: not a {} archive", url, ARCHIVE_EXTENSION);
                    DownloadOutcome::NotAnArchive { url: url.to_string() }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// GET `url` without credentials and stream the body into `dest`.
    ///
    /// A non-200 answer is reported as [`DownloadOutcome::Failed`] and no
    /// file is created. The file is held under an exclusive lock while it is
    /// written; if another process already holds one, the download fails
    /// with [`FetchError::Io`] and the existing contents are kept.
    pub async fn download_archive(&self, url: &str, dest: &Path) -> Result<DownloadOutcome> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(Stage::Archive, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!("Archive download from {} answered HTTP {}", url, status);
            return Ok(DownloadOutcome::Failed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Truncate only once the lock is held, so a file another process is
        // writing is left alone.
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(dest)
            .map_err(|e| io_error(dest, e))?;
        file.try_lock_exclusive().map_err(|e| {
            FetchError::Io(format!("{} is in use by another process: {}", dest.display(), e))
        })?;
        file.set_len(0).map_err(|e| io_error(dest, e))?;

        let written = match write_stream(&file, response, dest).await {
            Ok(written) => written,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(dest);
                return Err(e);
            }
        };

        // Unlocks on close.
        drop(file);
        tracing::info!("Wrote {} bytes to {}", written, dest.display());

        Ok(DownloadOutcome::Saved {
            url: url.to_string(),
            path: dest.to_path_buf(),
            bytes: written,
        })
    }
}

async fn write_stream(mut file: &File, response: reqwest::Response, dest: &Path) -> Result<u64> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| network_error(Stage::Archive, e))?;
        file.write_all(&chunk).map_err(|e| io_error(dest, e))?;
        written += chunk.len() as u64;
    }
    file.flush().map_err(|e| io_error(dest, e))?;
    Ok(written)
}

fn io_error(path: &Path, err: std::io::Error) -> FetchError {
    FetchError::Io(format!("{}: {}", path.display(), err))
}

/// Parse a manifest body. It must be a JSON object with a string `url`.
pub fn parse_manifest(body: &[u8]) -> Result<Manifest, FetchError> {
    let json: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::MalformedManifest(format!("body is not JSON: {}", e)))?;

    match json.get("url") {
        Some(Value::String(url)) => Ok(Manifest { url: url.clone() }),
        Some(_) => Err(FetchError::MalformedManifest("`url` is not a string".to_string())),
        None => Err(FetchError::MalformedManifest("`url` field missing".to_string())),
    }
}

/// File name for a candidate URL, or `None` if it is not a `.zip` archive.
///
/// The name is the last segment of the URL path, taken as-is.
pub fn archive_file_name(url: &str) -> Option<String> {
    let parsed = match url::Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Ignoring unparseable download URL {:?}: {}", url, e);
            return None;
        }
    };

    let name = parsed.path_segments()?.last()?;
    if name.len() > ARCHIVE_EXTENSION.len() && name.ends_with(ARCHIVE_EXTENSION) {
        Some(name.to_string())
    } else {
        None
    }
}
