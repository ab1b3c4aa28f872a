// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Wire operations against the prediction service

use bytes::Bytes;
use fingerid_types::{
    JobStatusResponse, PredictionPerformance, ReportResponse, SubmitResponse, VersionResponse,
    VersionsInfo, paths,
};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::SharedNetworkConfig;
use crate::error::ClientError;
use crate::job::{FingerIdJob, PollResult, PredictionRequest, ProbabilityFingerprint};
use crate::prediction::decode_prediction;
use crate::transport::Transport;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Per-feature training performance served by `statistics.csv`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FingerprintStatistics {
    /// Fingerprint feature index for each row
    pub indices: Vec<u32>,
    pub performances: Vec<PredictionPerformance>,
}

impl FingerprintStatistics {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Client for one prediction service, over its own [`Transport`]
pub struct FingerIdClient {
    transport: Transport,
}

impl FingerIdClient {
    /// Standalone client, not tracked by any registry
    pub fn new(config: SharedNetworkConfig) -> Result<Self, ClientError> {
        Ok(Self {
            transport: Transport::new(config)?,
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Probe the service, reconnecting once if it does not answer
    pub async fn is_connected(&self) -> bool {
        self.transport.probe().await
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let base = self.transport.config().snapshot().base_url()?;
        Ok(base.join(path)?)
    }

    /// Submit a prediction job.
    ///
    /// Anything but a success status is a [`ClientError::Submission`], and a
    /// reply without a job id and token is a
    /// [`ClientError::SubmissionMalformed`]; the service is not asked again.
    pub async fn submit_job(&self, request: &PredictionRequest) -> Result<FingerIdJob, ClientError> {
        let url = self.endpoint(paths::PREDICT)?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("ms", &request.ms)
            .append_pair("ft", &request.ft)
            .finish();

        let client = self.transport.lease().await?;
        let response = client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Prediction service rejected job submission");
            return Err(ClientError::Submission {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let bytes = response.bytes().await?;
        drop(client);

        let submitted: SubmitResponse = serde_json::from_slice(&bytes)
            .map_err(|source| ClientError::SubmissionMalformed { source })?;
        info!(job_id = submitted.job_id, "Submitted prediction job");

        Ok(FingerIdJob::new(
            submitted.job_id,
            submitted.security_token,
            request.schema.clone(),
        ))
    }

    /// Ask for the status of `job`.
    ///
    /// Returns [`PollResult::Done`] exactly when the response carries a
    /// prediction. Failures are wrapped in [`ClientError::Poll`] and never
    /// retried here.
    pub async fn poll_job(&self, job: &FingerIdJob) -> Result<PollResult, ClientError> {
        self.fetch_status(job)
            .await
            .map_err(|source| ClientError::Poll {
                job_id: job.id(),
                source: Box::new(source),
            })
    }

    async fn fetch_status(&self, job: &FingerIdJob) -> Result<PollResult, ClientError> {
        let mut url = self.endpoint(paths::JOB)?;
        url.query_pairs_mut()
            .append_pair("jobId", &job.id().to_string())
            .append_pair("securityToken", job.token());

        let client = self.transport.lease().await?;
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                endpoint: paths::JOB,
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        drop(client);

        let body: JobStatusResponse =
            serde_json::from_slice(&bytes).map_err(|e| ClientError::malformed(paths::JOB, e))?;

        match body.prediction {
            Some(encoded) => {
                let values = decode_prediction(&encoded)?;
                debug!(job_id = job.id(), values = values.len(), "Job finished");
                Ok(PollResult::Done(ProbabilityFingerprint::new(
                    job.schema().clone(),
                    values,
                )))
            }
            None => {
                let state = body.state.unwrap_or_default();
                debug!(job_id = job.id(), state = %state, "Job pending");
                Ok(PollResult::Pending(state))
            }
        }
    }

    // ========================================================================
    // Auxiliary endpoints
    // ========================================================================

    /// GET `url` and return the body, failing on any non-success status
    async fn get_bytes(&self, endpoint: &'static str, url: Url) -> Result<Bytes, ClientError> {
        let client = self.transport.lease().await?;
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = %status, "Unexpected status from prediction service");
            return Err(ClientError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?)
    }

    /// Latest release and database versions, plus any news
    pub async fn version_info(&self) -> Result<VersionsInfo, ClientError> {
        let url = self.endpoint(paths::VERSION)?;
        let bytes = self.get_bytes(paths::VERSION, url).await?;
        let response: VersionResponse =
            serde_json::from_slice(&bytes).map_err(|e| ClientError::malformed(paths::VERSION, e))?;
        Ok(response.into())
    }

    /// Per-feature performance table
    pub async fn statistics(&self) -> Result<FingerprintStatistics, ClientError> {
        let url = self.endpoint(paths::STATISTICS)?;
        let bytes = self.get_bytes(paths::STATISTICS, url).await?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| ClientError::malformed(paths::STATISTICS, e))?;
        parse_statistics(text)
    }

    /// Raw covariance scoring model, for an external loader
    pub async fn covariance_scoring(&self) -> Result<Bytes, ClientError> {
        let url = self.endpoint(paths::COVARIANCE_TREE)?;
        self.get_bytes(paths::COVARIANCE_TREE, url).await
    }

    /// Confidence model for the bio or full structure database, as lines
    pub async fn confidence_model(&self, bio: bool) -> Result<Vec<String>, ClientError> {
        let mut url = self.endpoint(paths::CONFIDENCE)?;
        url.query_pairs_mut()
            .append_pair("bio", if bio { "true" } else { "false" });
        let bytes = self.get_bytes(paths::CONFIDENCE, url).await?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| ClientError::malformed(paths::CONFIDENCE, e))?;
        Ok(text.lines().map(str::to_string).collect())
    }

    /// Send an error report. Returns the service's message.
    ///
    /// A report the service refuses (`success: false`) is still `Ok`; its
    /// message is logged at error level.
    pub async fn report_error(
        &self,
        report: &serde_json::Value,
        software_name: &str,
    ) -> Result<String, ClientError> {
        let url = self.endpoint(paths::REPORT)?;
        let report = serde_json::to_string(report)
            .map_err(|e| ClientError::malformed(paths::REPORT, e))?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("report", &report)
            .append_pair("name", software_name)
            .finish();

        let client = self.transport.lease().await?;
        let response = client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Submission {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }
        let bytes = response.bytes().await?;
        drop(client);

        let reply: ReportResponse =
            serde_json::from_slice(&bytes).map_err(|e| ClientError::malformed(paths::REPORT, e))?;
        if reply.success {
            info!(message = %reply.message, "Error report accepted");
        } else {
            error!(message = %reply.message, "Error report refused");
        }
        Ok(reply.message)
    }
}

/// Parse `index\ttp\tfp\ttn\tfn` rows. Blank lines are skipped.
pub fn parse_statistics(text: &str) -> Result<FingerprintStatistics, ClientError> {
    let mut stats = FingerprintStatistics::default();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let bad_line = |what: &str| {
            ClientError::malformed(paths::STATISTICS, format!("line {}: {}", n + 1, what))
        };

        let cols: Vec<&str> = line.split('\t').map(str::trim).collect();
        if cols.len() != 5 {
            return Err(bad_line(&format!("expected 5 columns, found {}", cols.len())));
        }
        let index: u32 = cols[0]
            .parse()
            .map_err(|_| bad_line(&format!("invalid index {:?}", cols[0])))?;
        let mut counts = [0f64; 4];
        for (slot, raw) in counts.iter_mut().zip(&cols[1..]) {
            *slot = raw
                .parse()
                .map_err(|_| bad_line(&format!("invalid number {:?}", raw)))?;
        }

        stats.indices.push(index);
        stats
            .performances
            .push(PredictionPerformance::new(counts[0], counts[1], counts[2], counts[3]));
    }
    Ok(stats)
}
