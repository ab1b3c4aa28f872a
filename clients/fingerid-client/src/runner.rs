// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Background submit-and-poll driver.
//!
//! [`JobRunner::run`] spawns one task per prediction. The task waits for a
//! pool slot, submits, then polls with a growing delay until the job is done,
//! crashes, or the attempt budget runs out. Each task ends in exactly one
//! [`JobOutcome`].
//!
//! The service has no cancel endpoint. A job abandoned by cancellation or
//! timeout keeps running remotely; the runner logs its id and moves on.

use std::sync::Arc;

use async_trait::async_trait;
use fingerid_types::{JobId, JobState};
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::FingerIdClient;
use crate::config::{PollPolicy, RunnerConfig};
use crate::error::ClientError;
use crate::job::{FingerIdJob, PollResult, PredictionRequest, ProbabilityFingerprint};

/// The two wire calls a job run needs
#[async_trait]
pub trait JobProtocol: Send + Sync + 'static {
    async fn submit(&self, request: &PredictionRequest) -> Result<FingerIdJob, ClientError>;

    async fn poll(&self, job: &FingerIdJob) -> Result<PollResult, ClientError>;
}

#[async_trait]
impl JobProtocol for FingerIdClient {
    async fn submit(&self, request: &PredictionRequest) -> Result<FingerIdJob, ClientError> {
        self.submit_job(request).await
    }

    async fn poll(&self, job: &FingerIdJob) -> Result<PollResult, ClientError> {
        self.poll_job(job).await
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("prediction job {job_id} crashed on the server")]
    RemoteJobFailed { job_id: JobId },

    #[error("prediction job {job_id} not finished after {attempts} polls")]
    Timeout { job_id: JobId, attempts: u32 },

    #[error("prediction job cancelled")]
    Cancelled { job_id: Option<JobId> },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("job task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How a job run ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        job: FingerIdJob,
        fingerprint: ProbabilityFingerprint,
    },
    Crashed {
        job: FingerIdJob,
    },
    TimedOut {
        job: FingerIdJob,
        attempts: u32,
    },
    /// `job` is `None` if cancellation came before submission finished
    Cancelled {
        job: Option<FingerIdJob>,
    },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }

    pub fn into_fingerprint(self) -> Result<ProbabilityFingerprint, RunnerError> {
        match self {
            JobOutcome::Completed { fingerprint, .. } => Ok(fingerprint),
            JobOutcome::Crashed { job } => Err(RunnerError::RemoteJobFailed { job_id: job.id() }),
            JobOutcome::TimedOut { job, attempts } => Err(RunnerError::Timeout {
                job_id: job.id(),
                attempts,
            }),
            JobOutcome::Cancelled { job } => Err(RunnerError::Cancelled {
                job_id: job.map(|j| j.id()),
            }),
        }
    }
}

/// Caller side of one running job.
///
/// Dropping the handle cancels the job.
pub struct JobHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<Result<JobOutcome, ClientError>>,
}

impl JobHandle {
    /// Ask the job to stop. It stops at its next sleep or in-flight request.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the outcome
    pub async fn wait(self) -> Result<JobOutcome, RunnerError> {
        let JobHandle { cancel_tx, task } = self;
        let outcome = task.await??;
        drop(cancel_tx);
        Ok(outcome)
    }

    /// Wait for the outcome, treating anything but completion as an error
    pub async fn fingerprint(self) -> Result<ProbabilityFingerprint, RunnerError> {
        self.wait().await?.into_fingerprint()
    }
}

/// Runs prediction jobs on the tokio runtime, at most
/// [`RunnerConfig::max_concurrent_jobs`] at a time.
pub struct JobRunner<P: JobProtocol = FingerIdClient> {
    protocol: Arc<P>,
    policy: PollPolicy,
    permits: Arc<Semaphore>,
}

impl<P: JobProtocol> JobRunner<P> {
    pub fn new(protocol: Arc<P>, config: RunnerConfig) -> Self {
        Self {
            protocol,
            policy: config.poll,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Start a job in the background. Must be called within a tokio runtime.
    pub fn run(&self, request: PredictionRequest) -> JobHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(drive(
            Arc::clone(&self.protocol),
            self.policy,
            Arc::clone(&self.permits),
            request,
            cancel_rx,
        ));
        JobHandle { cancel_tx, task }
    }
}

/// Resolves once cancellation is requested or the handle is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn log_orphaned(job: &FingerIdJob, reason: &str) {
    warn!(
        job_id = job.id(),
        state = %job.state(),
        reason,
        "Abandoning prediction job, it stays on the server"
    );
}

async fn drive<P: JobProtocol>(
    protocol: Arc<P>,
    policy: PollPolicy,
    permits: Arc<Semaphore>,
    request: PredictionRequest,
    mut cancel_rx: watch::Receiver<bool>,
) -> Result<JobOutcome, ClientError> {
    let _permit = tokio::select! {
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            // The semaphore is never closed while a runner exists
            Err(_) => return Ok(JobOutcome::Cancelled { job: None }),
        },
        _ = cancelled(&mut cancel_rx) => {
            debug!("Job cancelled while waiting for a runner slot");
            return Ok(JobOutcome::Cancelled { job: None });
        }
    };

    let mut job = tokio::select! {
        job = protocol.submit(&request) => job?,
        _ = cancelled(&mut cancel_rx) => {
            warn!("Job cancelled during submission, it may exist on the server");
            return Ok(JobOutcome::Cancelled { job: None });
        }
    };

    for attempt in 0..policy.max_attempts {
        tokio::select! {
            _ = tokio::time::sleep(policy.delay_for(attempt)) => {}
            _ = cancelled(&mut cancel_rx) => {
                log_orphaned(&job, "cancelled");
                return Ok(JobOutcome::Cancelled { job: Some(job) });
            }
        }

        let result = tokio::select! {
            result = protocol.poll(&job) => result?,
            _ = cancelled(&mut cancel_rx) => {
                log_orphaned(&job, "cancelled");
                return Ok(JobOutcome::Cancelled { job: Some(job) });
            }
        };

        match result {
            PollResult::Done(fingerprint) => {
                job.complete(fingerprint.clone());
                info!(job_id = job.id(), attempt, values = fingerprint.len(), "Prediction job done");
                return Ok(JobOutcome::Completed { job, fingerprint });
            }
            PollResult::Pending(JobState::Crashed) => {
                job.advance(JobState::Crashed);
                warn!(job_id = job.id(), attempt, "Prediction job crashed");
                return Ok(JobOutcome::Crashed { job });
            }
            PollResult::Pending(state) => {
                if job.advance(state) {
                    info!(job_id = job.id(), state = %job.state(), "Prediction job state changed");
                }
                debug!(job_id = job.id(), attempt, "Prediction job pending");
            }
        }
    }

    log_orphaned(&job, "attempt budget exhausted");
    Ok(JobOutcome::TimedOut {
        job,
        attempts: policy.max_attempts,
    })
}
