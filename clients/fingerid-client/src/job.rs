// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Client-side view of a remote prediction job

use fingerid_types::{JobId, JobState, SecurityToken};

/// Fingerprint layout version the caller expects back. Opaque to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FingerprintSchema(pub String);

impl FingerprintSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The two documents a prediction is computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionRequest {
    /// Processed spectrum and metadata, in the service's `.ms` text format
    pub ms: String,
    /// Fragmentation tree as JSON
    pub ft: String,
    pub schema: FingerprintSchema,
}

impl PredictionRequest {
    pub fn new(ms: impl Into<String>, ft: impl Into<String>, schema: FingerprintSchema) -> Self {
        Self {
            ms: ms.into(),
            ft: ft.into(),
            schema,
        }
    }
}

/// Predicted per-feature probabilities
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityFingerprint {
    schema: FingerprintSchema,
    values: Vec<f64>,
}

impl ProbabilityFingerprint {
    pub fn new(schema: FingerprintSchema, values: Vec<f64>) -> Self {
        Self { schema, values }
    }

    pub fn schema(&self) -> &FingerprintSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Result of one status request
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Done(ProbabilityFingerprint),
    Pending(JobState),
}

/// A submitted job.
///
/// Identity (`id`, `token`) is fixed at submission. State only moves
/// forward; see [`FingerIdJob::advance`].
#[derive(Debug, Clone, PartialEq)]
pub struct FingerIdJob {
    id: JobId,
    token: SecurityToken,
    schema: FingerprintSchema,
    state: JobState,
    result: Option<ProbabilityFingerprint>,
}

impl FingerIdJob {
    pub fn new(id: JobId, token: SecurityToken, schema: FingerprintSchema) -> Self {
        Self {
            id,
            token,
            schema,
            state: JobState::Submitted,
            result: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn schema(&self) -> &FingerprintSchema {
        &self.schema
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn result(&self) -> Option<&ProbabilityFingerprint> {
        self.result.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next` if that is progress.
    ///
    /// Terminal jobs never change; otherwise the state may stay put or move
    /// forward, and an unknown service state counts as running. `Done` is
    /// only reached through [`FingerIdJob::complete`]: a job the service
    /// calls done but whose fingerprint has not arrived yet stays open.
    /// Returns whether the state changed.
    pub fn advance(&mut self, next: JobState) -> bool {
        if next == JobState::Done {
            return false;
        }
        self.step(next)
    }

    /// Record the fingerprint and mark the job done
    pub fn complete(&mut self, fingerprint: ProbabilityFingerprint) -> bool {
        if !self.step(JobState::Done) {
            return false;
        }
        self.result = Some(fingerprint);
        true
    }

    fn step(&mut self, next: JobState) -> bool {
        if self.state.is_terminal() || next.progress() < self.state.progress() {
            return false;
        }
        if next == self.state {
            return false;
        }
        self.state = next;
        true
    }
}
