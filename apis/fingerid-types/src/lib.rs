// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Wire types for the CSI:FingerID prediction web API.
//!
//! The remote service accepts a prediction job (a processed spectrum plus its
//! fragmentation tree), hands back a job id and security token, and is then
//! polled until the job either produces a fingerprint or crashes. This crate
//! holds the JSON bodies exchanged on that path and on the auxiliary
//! read-only endpoints (version, statistics, compounds, error reports).
//!
//! Payload semantics (spectra, trees, compounds, news entries) are opaque
//! here: they are carried as strings or [`serde_json::Value`]s.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{EnumString, VariantNames};

// ============================================================================
// Type Aliases
// ============================================================================

/// Job identifier assigned by the remote service at submission
pub type JobId = i64;

/// Opaque per-job secret that must accompany every status request
pub type SecurityToken = String;

// ============================================================================
// Endpoints
// ============================================================================

/// Endpoint paths, relative to the service base URL.
pub mod paths {
    /// `POST`, form fields `ms` and `ft`
    pub const PREDICT: &str = "webapi/predict.json";
    /// `GET`, query `jobId` and `securityToken`
    pub const JOB: &str = "webapi/job.json";
    pub const VERSION: &str = "webapi/version.json";
    pub const STATISTICS: &str = "webapi/statistics.csv";
    pub const COVARIANCE_TREE: &str = "webapi/covariancetree.csv";
    /// `GET`, query `bio`
    pub const CONFIDENCE: &str = "webapi/confidence.json";
    /// `POST`, form fields `report` and `name`
    pub const REPORT: &str = "webapi/report.json";

    /// Path of the compound batch for one molecular formula.
    pub fn compounds(formula: &str, bio: bool) -> String {
        let db = if bio { "bio" } else { "not-bio" };
        format!("webapi/compounds/{}/{}.json", db, formula)
    }
}

// ============================================================================
// Job Types
// ============================================================================

/// Remote state of a prediction job.
///
/// The service reports at least `SUBMITTED` and `CRASHED`; anything it sends
/// that we do not know about is carried through verbatim in [`JobState::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, EnumString, VariantNames)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum JobState {
    /// Accepted by the service, not yet picked up
    #[default]
    Submitted,
    /// Being computed
    Running,
    /// Finished; the status response carries a prediction
    Done,
    /// Failed on the remote side. Terminal.
    Crashed,
    /// A state string this client does not interpret
    #[strum(default)]
    Other(String),
}

impl JobState {
    /// Wire representation of the state.
    pub fn as_str(&self) -> &str {
        match self {
            JobState::Submitted => "SUBMITTED",
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Crashed => "CRASHED",
            JobState::Other(s) => s,
        }
    }

    /// Whether no further transition is possible from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Crashed)
    }

    /// Position in the `Submitted -> Running -> {Done, Crashed}` order.
    ///
    /// Unknown states rank with `Running`: the service has seen the job.
    pub fn progress(&self) -> u8 {
        match self {
            JobState::Submitted => 0,
            JobState::Running | JobState::Other(_) => 1,
            JobState::Done | JobState::Crashed => 2,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobState {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(state) => state,
            Err(_) => JobState::Other(s),
        }
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl Serialize for JobState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(JobState::from)
    }
}

/// Body returned by a successful `predict.json` submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub security_token: SecurityToken,
}

/// Body returned by `job.json`.
///
/// A present `prediction` means the job is done; otherwise `state` says
/// where it is (absent means it has not been picked up yet).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Base64 over little-endian `f64`s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JobState>,
}

impl JobStatusResponse {
    /// Reported state, defaulting to [`JobState::Submitted`] when absent.
    pub fn state_or_default(&self) -> JobState {
        self.state.clone().unwrap_or_default()
    }
}

// ============================================================================
// Auxiliary Types
// ============================================================================

/// Raw `version.json` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    #[serde(rename = "SIRIUS GUI")]
    pub gui: ReleaseInfo,
    pub database: DatabaseInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news: Option<Vec<Value>>,
}

/// Latest published client release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub date: String,
}

/// Structure database release served by the prediction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub version: String,
}

/// Flattened view of [`VersionResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionsInfo {
    pub gui_version: String,
    pub release_date: String,
    pub database_version: String,
    /// Opaque news entries, empty when the service sent none
    pub news: Vec<Value>,
}

impl From<VersionResponse> for VersionsInfo {
    fn from(r: VersionResponse) -> Self {
        VersionsInfo {
            gui_version: r.gui.version,
            release_date: r.gui.date,
            database_version: r.database.version,
            news: r.news.unwrap_or_default(),
        }
    }
}

impl VersionsInfo {
    /// Whether the published release is newer than `current`.
    ///
    /// Versions are compared as dotted numeric components; missing
    /// components count as zero and any non-digit suffix of a component
    /// (e.g. `-SNAPSHOT`) is ignored.
    pub fn is_newer_than(&self, current: &str) -> bool {
        compare_versions(&self.gui_version, current) == Ordering::Greater
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    fn components(v: &str) -> Vec<u64> {
        v.trim()
            .split('.')
            .map(|c| {
                let digits: String = c.chars().take_while(|ch| ch.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    }

    let (a, b) = (components(a), components(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Cross-validated quality of one fingerprint property predictor.
///
/// One row of `statistics.csv`: `index\ttp\tfp\ttn\tfn`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionPerformance {
    pub tp: f64,
    pub fp: f64,
    pub tn: f64,
    #[serde(rename = "fn")]
    pub fn_: f64,
}

impl PredictionPerformance {
    pub fn new(tp: f64, fp: f64, tn: f64, fn_: f64) -> Self {
        Self { tp, fp, tn, fn_ }
    }

    /// `tp / (tp + fn)`, or 0 when the property never occurs
    pub fn recall(&self) -> f64 {
        let positives = self.tp + self.fn_;
        if positives > 0.0 { self.tp / positives } else { 0.0 }
    }

    /// `tp / (tp + fp)`, or 0 when the property was never predicted
    pub fn precision(&self) -> f64 {
        let predicted = self.tp + self.fp;
        if predicted > 0.0 { self.tp / predicted } else { 0.0 }
    }
}

/// Body returned by `report.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportResponse {
    pub success: bool,
    pub message: String,
}

/// One candidate structure from a compound batch.
///
/// Only the InChIKey is surfaced; everything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inchikey: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Body of `compounds/{bio|not-bio}/{formula}.json`.
///
/// The service has served both a bare array and an object wrapping it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CompoundBatch {
    List(Vec<CompoundRecord>),
    Wrapped { compounds: Vec<CompoundRecord> },
}

impl CompoundBatch {
    pub fn into_records(self) -> Vec<CompoundRecord> {
        match self {
            CompoundBatch::List(records) => records,
            CompoundBatch::Wrapped { compounds } => compounds,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
