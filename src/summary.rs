// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-day activity summaries.
//!
//! The band-data endpoint answers with a `data` array of days. Each day's
//! `summary` is base64-encoded JSON keyed by activity type: `stp` for steps,
//! `slp` for sleep. This module decodes those blobs and renders them as
//! text. It is only used with `--summary` and never downloads anything.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Local, TimeZone};
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;

#[derive(Debug, Deserialize)]
struct BandData {
    data: Vec<RawDay>,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    #[serde(default)]
    date_time: String,
    #[serde(default)]
    summary: String,
}

/// Step totals for one day.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StepSummary {
    /// Total steps.
    #[serde(default)]
    pub ttl: u64,
    /// Calories (kcal).
    #[serde(default)]
    pub cal: u64,
    /// Distance (meters).
    #[serde(default)]
    pub dis: u64,
    #[serde(default)]
    pub stage: Vec<StepStage>,
}

/// One block of activity within a day. Times are minutes since midnight.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StepStage {
    #[serde(default)]
    pub mode: i64,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub stop: i64,
    #[serde(default)]
    pub step: u64,
}

/// Sleep totals for one night.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SleepSummary {
    /// Light sleep (minutes).
    #[serde(default)]
    pub lt: i64,
    /// Deep sleep (minutes).
    #[serde(default)]
    pub dp: i64,
    /// Start, unix seconds.
    #[serde(default)]
    pub st: i64,
    /// End, unix seconds.
    #[serde(default)]
    pub ed: i64,
    #[serde(default)]
    pub stage: Vec<SleepStage>,
}

/// One block of sleep. Times are minutes since midnight.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SleepStage {
    #[serde(default)]
    pub mode: i64,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub stop: i64,
}

/// One decoded entry of a day's summary.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryEntry {
    Steps(StepSummary),
    Sleep(SleepSummary),
    Other { key: String, value: Value },
}

/// A day whose summary decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DayReport {
    pub date: String,
    pub entries: Vec<SummaryEntry>,
}

/// Result of decoding one day.
#[derive(Debug, Clone, PartialEq)]
pub enum DaySummary {
    Decoded(DayReport),
    Undecodable { date: String, reason: String },
}

/// Decode every day in a band-data body.
pub fn decode_band_data(body: &[u8]) -> Result<Vec<DaySummary>, FetchError> {
    let band: BandData = serde_json::from_slice(body)
        .map_err(|e| FetchError::MalformedActivity(e.to_string()))?;

    Ok(band
        .data
        .into_iter()
        .map(|day| match decode_day(&day.summary) {
            Ok(entries) => DaySummary::Decoded(DayReport {
                date: day.date_time,
                entries,
            }),
            Err(reason) => {
                tracing::warn!("Summary for {} could not be decoded: {}", day.date_time, reason);
                DaySummary::Undecodable {
                    date: day.date_time,
                    reason,
                }
            }
        })
        .collect())
}

/// Decode one base64 summary blob into its entries, in key order.
pub fn decode_day(encoded: &str) -> Result<Vec<SummaryEntry>, String> {
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("invalid base64: {}", e))?;
    let map: BTreeMap<String, Value> =
        serde_json::from_slice(&raw).map_err(|e| format!("invalid JSON: {}", e))?;

    map.into_iter()
        .map(|(key, value)| -> Result<SummaryEntry, String> {
            let entry = match key.as_str() {
                "stp" => SummaryEntry::Steps(
                    serde_json::from_value(value).map_err(|e| format!("stp: {}", e))?,
                ),
                "slp" => SummaryEntry::Sleep(
                    serde_json::from_value(value).map_err(|e| format!("slp: {}", e))?,
                ),
                _ => SummaryEntry::Other { key, value },
            };
            Ok(entry)
        })
        .collect()
}

/// Render minutes as `HH:MM`, wrapping hours at 24.
pub fn minutes_as_time(minutes: i64) -> String {
    format!("{:02}:{:02}", (minutes / 60).rem_euclid(24), minutes.rem_euclid(60))
}

fn activity_name(mode: i64) -> String {
    match mode {
        1 => "slow walking".to_string(),
        3 => "fast walking".to_string(),
        4 => "running".to_string(),
        7 => "light activity".to_string(),
        other => format!("unknown activity type: {}", other),
    }
}

fn sleep_name(mode: i64) -> String {
    match mode {
        4 => "light sleep".to_string(),
        5 => "deep sleep".to_string(),
        other => format!("unknown sleep type: {}", other),
    }
}

fn local_time(secs: i64) -> String {
    Local
        .timestamp_opt(secs, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Text lines for a step summary.
pub fn format_steps(steps: &StepSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Total steps: {}, used {} kcals, walked {} meters",
        steps.ttl, steps.cal, steps.dis
    )];
    for stage in &steps.stage {
        lines.push(format!(
            "{} - {} {} steps {}",
            minutes_as_time(stage.start),
            minutes_as_time(stage.stop),
            stage.step,
            activity_name(stage.mode)
        ));
    }
    lines
}

/// Text lines for a sleep summary.
pub fn format_sleep(sleep: &SleepSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Total sleep: {}, deep sleep {}, light sleep {}, slept from {} until {}",
        minutes_as_time(sleep.lt + sleep.dp),
        minutes_as_time(sleep.dp),
        minutes_as_time(sleep.lt),
        local_time(sleep.st),
        local_time(sleep.ed)
    )];
    for stage in &sleep.stage {
        lines.push(format!(
            "{} - {} {}",
            minutes_as_time(stage.start),
            minutes_as_time(stage.stop),
            sleep_name(stage.mode)
        ));
    }
    lines
}

/// Text lines for a whole day, date first.
pub fn format_day(day: &DaySummary) -> Vec<String> {
    match day {
        DaySummary::Decoded(report) => {
            let mut lines = vec![report.date.clone()];
            for entry in &report.entries {
                match entry {
                    SummaryEntry::Steps(steps) => lines.extend(format_steps(steps)),
                    SummaryEntry::Sleep(sleep) => lines.extend(format_sleep(sleep)),
                    SummaryEntry::Other { key, value } => lines.push(format!("{} = {}", key, value)),
                }
            }
            lines
        }
        DaySummary::Undecodable { date, reason } => {
            vec![date.clone(), format!("summary unavailable: {}", reason)]
        }
    }
}
