// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Error types for the FingerID client

use fingerid_types::JobId;
use stream_tee::TeeError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::prediction::PredictionDecodeError;

/// Failures of a single wire operation
#[derive(Debug, Error)]
pub enum ClientError {
    /// No usable connection. A reconnect may fix it.
    #[error("no connection to the prediction service: {0}")]
    Connectivity(String),

    #[error("job submission rejected: HTTP {status} {reason}")]
    Submission { status: u16, reason: String },

    /// The service accepted the job but the reply carried no usable job id
    /// or token, so the job cannot be tracked.
    #[error("job submission returned an unusable response: {source}")]
    SubmissionMalformed {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to poll job {job_id}: {source}")]
    Poll {
        job_id: JobId,
        #[source]
        source: Box<ClientError>,
    },

    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse {
        endpoint: &'static str,
        reason: String,
    },

    #[error("failed to decode prediction: {0}")]
    Decode(#[from] PredictionDecodeError),

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("stream cache failed: {0}")]
    StreamIo(#[from] TeeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// Whether reconnecting the transport could help
    pub fn is_connectivity(&self) -> bool {
        match self {
            ClientError::Connectivity(_) => true,
            ClientError::Poll { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }

    /// Whether the service refused or garbled a job submission
    pub fn is_submission(&self) -> bool {
        matches!(
            self,
            ClientError::Submission { .. } | ClientError::SubmissionMalformed { .. }
        )
    }

    pub(crate) fn malformed(endpoint: &'static str, reason: impl ToString) -> Self {
        ClientError::MalformedResponse {
            endpoint,
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ClientError::Connectivity(e.to_string())
        } else {
            ClientError::Http(e)
        }
    }
}
