// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Client for the CSI:FingerID remote fingerprint prediction service.
//!
//! - [`Transport`]: one proxy-aware HTTP client, replaced atomically on
//!   reconnect.
//! - [`ClientRegistry`]: every live client, so a network settings change can
//!   be broadcast.
//! - [`FingerIdClient`]: submit, poll and the auxiliary downloads.
//! - [`JobRunner`]: background submit-and-poll with a bounded attempt budget
//!   and cooperative cancellation.
//!
//! ```ignore
//! let registry = ClientRegistry::new(NetworkConfig::from_env()?);
//! let client = registry.create()?;
//! let runner = JobRunner::new(client.shared(), RunnerConfig::default());
//! let fingerprint = runner.run(request).fingerprint().await?;
//! ```

pub mod client;
pub mod compounds;
pub mod config;
pub mod error;
pub mod job;
pub mod prediction;
pub mod registry;
pub mod runner;
pub mod transport;

pub use client::{FingerIdClient, FingerprintStatistics};
pub use config::{
    ConfigError, NetworkConfig, PollPolicy, ProxyConfig, ProxyMode, RunnerConfig,
    SharedNetworkConfig,
};
pub use error::ClientError;
pub use job::{FingerIdJob, FingerprintSchema, PollResult, PredictionRequest, ProbabilityFingerprint};
pub use prediction::{PredictionDecodeError, decode_prediction, encode_prediction};
pub use registry::{ClientHandle, ClientRegistry, ReconnectSummary};
pub use runner::{JobHandle, JobOutcome, JobProtocol, JobRunner, RunnerError};
pub use transport::Transport;
