// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::ProgressBar;

use mifit_fetch::summary::format_day;
use mifit_fetch::{
    exit_code_for, exit_codes, run, Credentials, DownloadOutcome, Event, FetchError, FetchMode,
    FetchRequest, HuamiClient,
};

/// Log in to a Huami / Mi Fit account and download a watch-face archive.
#[derive(Parser, Debug)]
#[command(name = "mifit-fetch", version, about)]
struct Cli {
    /// Email address for login
    #[arg(long)]
    email: String,

    /// Password for login
    #[arg(long)]
    password: String,

    /// URL of the watch-face manifest (from the QR code)
    #[arg(long)]
    url: String,

    /// Directory the archive is written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Decode per-day activity summaries from the URL instead of downloading
    #[arg(long)]
    summary: bool,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    /// Create a spinner with consistent styling
    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    /// Clear spinner silently
    pub fn clear(spinner: Option<ProgressBar>) {
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Text printed for a progress event.
fn describe(event: &Event) -> String {
    match event {
        Event::LoggingIn { email } => format!("Logging in with email {}", email),
        Event::ObtainedAccessToken => format!("{} Obtained access token", "[OK]".green()),
        Event::SessionEstablished { user_id } => {
            format!("{} Logged in as user {}", "[OK]".green(), user_id)
        }
        Event::Retrieving { url } => format!("Retrieving {}", url),
        Event::Response { status } => format!("Response: HTTP {}", status),
        Event::Download(DownloadOutcome::Saved { path, bytes, .. }) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            format!(
                "{} Zip file '{}' downloaded successfully ({} bytes).",
                "[OK]".green(),
                name,
                bytes
            )
        }
        Event::Download(DownloadOutcome::Failed { status, .. }) => format!(
            "{} Failed to download zip file. Status code: {}",
            "[!]".yellow(),
            status
        ),
        Event::Download(DownloadOutcome::NotAnArchive { url }) => {
            format!("{} Manifest does not reference a .zip archive: {}", "[!]".yellow(), url)
        }
        Event::Day(day) => format_day(day).join("\n"),
    }
}

fn report_event(event: &Event, active: &mut Option<ProgressBar>) {
    spinner::clear(active.take());
    println!("{}", describe(event));

    let waiting = match event {
        Event::LoggingIn { .. } => Some("Requesting access token..."),
        Event::ObtainedAccessToken => Some("Establishing session..."),
        Event::Retrieving { .. } => Some("Waiting for response..."),
        _ => None,
    };
    *active = waiting.map(spinner::create);
}

/// Text printed on stderr for a fatal error. The help block carries its own
/// marker, so the first line does not.
fn describe_error(err: &anyhow::Error) -> String {
    let mut text = format!("{} {:#}", "Error:".red(), err);

    let help = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<FetchError>())
        .and_then(FetchError::help);
    if let Some(help) = help {
        text.push_str("\n\n");
        text.push_str(help.trim_end());
    }
    text
}

fn exit_code(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => exit_code_for(e),
    }
}

async fn fetch(cli: Cli) -> Result<()> {
    let client = HuamiClient::new()?;
    let request = FetchRequest {
        credentials: Credentials::new(cli.email, cli.password),
        url: cli.url,
        output_dir: cli.output_dir,
        mode: if cli.summary {
            FetchMode::Summary
        } else {
            FetchMode::Download
        },
    };

    let mut active = None;
    let result = run(&client, &request, |event| report_event(event, &mut active)).await;
    spinner::clear(active);

    let report = result?;
    tracing::debug!(
        "Run finished: HTTP {}, {} archive(s) saved",
        report.status,
        report.saved_count()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")
        .and_then(|runtime| runtime.block_on(fetch(cli)));

    if let Err(e) = &result {
        eprintln!("{}", describe_error(e));
    }
    std::process::exit(exit_code(&result));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_describe_failed_download() {
        plain();
        let event = Event::Download(DownloadOutcome::Failed {
            url: "https://cdn.example.com/faces/123.zip".into(),
            status: 404,
        });
        assert_eq!(describe(&event), "[!] Failed to download zip file. Status code: 404");
    }

    #[test]
    fn test_describe_saved_download() {
        plain();
        let event = Event::Download(DownloadOutcome::Saved {
            url: "https://cdn.example.com/faces/123.zip".into(),
            path: PathBuf::from("out").join("123.zip"),
            bytes: 8,
        });
        assert_eq!(
            describe(&event),
            "[OK] Zip file '123.zip' downloaded successfully (8 bytes)."
        );
    }

    #[test]
    fn test_describe_error_has_one_marker() {
        plain();
        let err: Result<()> = Err(FetchError::MissingAccessToken.into());
        let err = err.context("Credential exchange").unwrap_err();

        let text = describe_error(&err);
        assert!(text.starts_with("Error: Credential exchange: No access token in response"));
        assert!(text.contains("Login was not accepted"));
        assert_eq!(text.matches("[✗]").count(), 1);
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&Ok(())), 0);
        assert_eq!(exit_code(&Err(FetchError::MissingAccessToken.into())), 1);
        assert_eq!(exit_code(&Err(FetchError::Io("disk full".into()).into())), 74);
    }
}
