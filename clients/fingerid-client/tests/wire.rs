// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

// Allow expect/unwrap in tests - they provide clear panic messages on failure
#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Wire-level tests against a mock prediction service.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use fingerid_client::{
    ClientError, FingerIdClient, FingerIdJob, FingerprintSchema, JobOutcome, JobRunner,
    NetworkConfig, PollPolicy, PollResult, PredictionDecodeError, PredictionRequest, ProxyMode,
    RunnerConfig, RunnerError, SharedNetworkConfig, encode_prediction,
};
use fingerid_types::JobState;
use flate2::read::GzDecoder;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Test Infrastructure
// ============================================================================

struct TestContext {
    server: MockServer,
    client: Arc<FingerIdClient>,
}

impl TestContext {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let client = FingerIdClient::new(SharedNetworkConfig::new(config_for(&server.uri())))
            .expect("failed to build client");
        Self {
            server,
            client: Arc::new(client),
        }
    }

    async fn mount_json(&self, http_method: &str, endpoint: &str, status: u16, body: serde_json::Value) {
        Mock::given(method(http_method))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

fn config_for(base_url: &str) -> NetworkConfig {
    let mut config = NetworkConfig::with_base_url(base_url);
    config.proxy.mode = ProxyMode::None;
    config.request_timeout_secs = 5;
    config.probe_timeout_secs = 2;
    config
}

fn request() -> PredictionRequest {
    PredictionRequest::new("abc", "{}", FingerprintSchema::new("csi-v2"))
}

fn job(id: i64, token: &str) -> FingerIdJob {
    FingerIdJob::new(id, token.to_string(), FingerprintSchema::new("csi-v2"))
}

fn fast_policy() -> RunnerConfig {
    RunnerConfig {
        max_concurrent_jobs: 2,
        poll: PollPolicy {
            max_attempts: 5,
            base_delay_ms: 1,
            delay_increment_ms: 0,
        },
    }
}

fn read_gzip(path: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(std::fs::File::open(path).expect("open cache"))
        .read_to_end(&mut out)
        .expect("decompress cache");
    out
}

// ============================================================================
// Submit
// ============================================================================

#[tokio::test]
async fn submit_returns_server_identity() {
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path("/webapi/predict.json"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("ms=abc&ft=%7B%7D"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jobId": 4711, "securityToken": "s3cr3t"})),
        )
        .expect(1)
        .mount(&ctx.server)
        .await;

    let job = ctx.client.submit_job(&request()).await.unwrap();
    assert_eq!(job.id(), 4711);
    assert_eq!(job.token(), "s3cr3t");
    assert_eq!(job.state(), &JobState::Submitted);
    assert_eq!(job.schema().as_str(), "csi-v2");
}

#[tokio::test]
async fn submit_form_encodes_documents() {
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path("/webapi/predict.json"))
        .and(body_string_contains("ms=%3Ecompound+x%0A%3Eparentmass+180.06"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"jobId": 1, "securityToken": "t"})),
        )
        .expect(1)
        .mount(&ctx.server)
        .await;

    let request = PredictionRequest::new(
        ">compound x\n>parentmass 180.06",
        r#"{"root": "C6H12O6"}"#,
        FingerprintSchema::default(),
    );
    ctx.client.submit_job(&request).await.unwrap();
}

#[tokio::test]
async fn submit_rejected_status_is_submission_error() {
    let ctx = TestContext::new().await;
    ctx.mount_json("POST", "/webapi/predict.json", 503, json!({})).await;

    match ctx.client.submit_job(&request()).await {
        Err(err @ ClientError::Submission { .. }) => {
            assert!(err.is_submission());
            assert!(matches!(err, ClientError::Submission { status: 503, .. }));
        }
        other => panic!("expected submission error, got {:?}", other),
    }
}

#[tokio::test]
async fn submit_malformed_body_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.mount_json("POST", "/webapi/predict.json", 200, json!({"jobId": "nope"}))
        .await;

    let err = ctx.client.submit_job(&request()).await.unwrap_err();
    assert!(matches!(err, ClientError::SubmissionMalformed { .. }), "{:?}", err);
    assert!(err.is_submission());
}

// ============================================================================
// Poll
// ============================================================================

#[tokio::test]
async fn poll_with_prediction_is_done() {
    let ctx = TestContext::new().await;
    let values = vec![0.0, 0.125, 0.5, 0.875, 1.0];
    Mock::given(method("GET"))
        .and(path("/webapi/job.json"))
        .and(query_param("jobId", "42"))
        .and(query_param("securityToken", "tok en/+"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"prediction": encode_prediction(&values)})),
        )
        .expect(1)
        .mount(&ctx.server)
        .await;

    match ctx.client.poll_job(&job(42, "tok en/+")).await.unwrap() {
        PollResult::Done(fingerprint) => {
            assert_eq!(fingerprint.values(), values.as_slice());
            assert_eq!(fingerprint.schema().as_str(), "csi-v2");
        }
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test]
async fn poll_without_prediction_is_pending() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/job.json"))
        .and(query_param("jobId", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/webapi/job.json"))
        .and(query_param("jobId", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "RUNNING"})))
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/webapi/job.json"))
        .and(query_param("jobId", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "QUEUED"})))
        .mount(&ctx.server)
        .await;

    assert_eq!(
        ctx.client.poll_job(&job(1, "t")).await.unwrap(),
        PollResult::Pending(JobState::Submitted)
    );
    assert_eq!(
        ctx.client.poll_job(&job(2, "t")).await.unwrap(),
        PollResult::Pending(JobState::Running)
    );
    assert_eq!(
        ctx.client.poll_job(&job(3, "t")).await.unwrap(),
        PollResult::Pending(JobState::Other("QUEUED".to_string()))
    );
}

#[tokio::test]
async fn poll_truncated_prediction_is_decode_error() {
    let ctx = TestContext::new().await;
    // 12 bytes: one whole double plus 4 stray bytes
    ctx.mount_json(
        "GET",
        "/webapi/job.json",
        200,
        json!({"prediction": "AAAAAAAA8D8AAAAA"}),
    )
    .await;

    match ctx.client.poll_job(&job(5, "t")).await {
        Err(ClientError::Poll { job_id, source }) => {
            assert_eq!(job_id, 5);
            assert!(matches!(
                *source,
                ClientError::Decode(PredictionDecodeError::TrailingBytes { len: 12, trailing: 4 })
            ));
        }
        other => panic!("expected poll error, got {:?}", other),
    }
}

#[tokio::test]
async fn poll_garbage_body_is_poll_error() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/job.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&ctx.server)
        .await;

    let err = ctx.client.poll_job(&job(5, "t")).await.unwrap_err();
    assert!(matches!(err, ClientError::Poll { job_id: 5, .. }), "{:?}", err);
}

// ============================================================================
// Runner over the wire
// ============================================================================

#[tokio::test]
async fn runner_completes_job() {
    let ctx = TestContext::new().await;
    ctx.mount_json(
        "POST",
        "/webapi/predict.json",
        200,
        json!({"jobId": 9, "securityToken": "t"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/webapi/job.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"prediction": encode_prediction(&[0.25, 0.75])})),
        )
        .expect(1)
        .mount(&ctx.server)
        .await;

    let runner = JobRunner::new(Arc::clone(&ctx.client), fast_policy());
    let fingerprint = runner.run(request()).fingerprint().await.unwrap();
    assert_eq!(fingerprint.values(), &[0.25, 0.75]);
}

#[tokio::test]
async fn runner_stops_on_crash() {
    let ctx = TestContext::new().await;
    ctx.mount_json(
        "POST",
        "/webapi/predict.json",
        200,
        json!({"jobId": 13, "securityToken": "t"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/webapi/job.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state": "CRASHED"})))
        // One poll per run, nothing after the crash
        .expect(2)
        .mount(&ctx.server)
        .await;

    let runner = JobRunner::new(Arc::clone(&ctx.client), fast_policy());
    match runner.run(request()).wait().await.unwrap() {
        JobOutcome::Crashed { job } => {
            assert_eq!(job.id(), 13);
            assert_eq!(job.state(), &JobState::Crashed);
        }
        other => panic!("expected crash, got {:?}", other),
    }

    let err = runner.run(request()).fingerprint().await;
    assert!(matches!(err, Err(RunnerError::RemoteJobFailed { job_id: 13 })));
}

#[tokio::test]
async fn runner_surfaces_submission_failure() {
    let ctx = TestContext::new().await;
    ctx.mount_json("POST", "/webapi/predict.json", 400, json!({})).await;

    let runner = JobRunner::new(Arc::clone(&ctx.client), fast_policy());
    let err = runner.run(request()).wait().await.unwrap_err();
    assert!(matches!(
        err,
        RunnerError::Client(ClientError::Submission { status: 400, .. })
    ));
    assert_eq!(ctx.server.received_requests().await.unwrap().len(), 1);
}

// ============================================================================
// Auxiliary endpoints
// ============================================================================

#[tokio::test]
async fn version_info_is_flattened() {
    let ctx = TestContext::new().await;
    ctx.mount_json(
        "GET",
        "/webapi/version.json",
        200,
        json!({
            "SIRIUS GUI": {"version": "4.0.1", "date": "2018-03-01"},
            "database": {"version": "2018-02-28"},
            "news": [{"id": 1, "message": "maintenance"}]
        }),
    )
    .await;

    let info = ctx.client.version_info().await.unwrap();
    assert_eq!(info.gui_version, "4.0.1");
    assert_eq!(info.release_date, "2018-03-01");
    assert_eq!(info.database_version, "2018-02-28");
    assert_eq!(info.news.len(), 1);
    assert!(info.is_newer_than("4.0.0"));
    assert!(!info.is_newer_than("4.0.1"));
}

#[tokio::test]
async fn statistics_are_parsed() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/statistics.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("3\t90\t10\t880\t20\n5\t1\t2\t3\t4\n"))
        .mount(&ctx.server)
        .await;

    let stats = ctx.client.statistics().await.unwrap();
    assert_eq!(stats.indices, vec![3, 5]);
    assert_eq!(stats.performances[0].tp, 90.0);
    assert_eq!(stats.performances[1].fn_, 4.0);
}

#[tokio::test]
async fn covariance_scoring_error_status() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/covariancetree.csv"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ctx.server)
        .await;

    let err = ctx.client.covariance_scoring().await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 500, .. }));
}

#[tokio::test]
async fn covariance_scoring_body_is_opaque() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/covariancetree.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2, 255]))
        .mount(&ctx.server)
        .await;

    let body = ctx.client.covariance_scoring().await.unwrap();
    assert_eq!(body.as_ref(), &[0u8, 1, 2, 255]);
}

#[tokio::test]
async fn confidence_model_lines() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/confidence.json"))
        .and(query_param("bio", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"svm\": 1}\nline two\n"))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let lines = ctx.client.confidence_model(true).await.unwrap();
    assert_eq!(lines, vec!["{\"svm\": 1}".to_string(), "line two".to_string()]);
}

#[tokio::test]
async fn report_error_returns_message() {
    let ctx = TestContext::new().await;
    Mock::given(method("POST"))
        .and(path("/webapi/report.json"))
        .and(body_string_contains("name=fingerid-cli"))
        .and(body_string_contains("%22subject%22%3A%22crash%22"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "message": "Thanks for your report"})),
        )
        .expect(1)
        .mount(&ctx.server)
        .await;

    let message = ctx
        .client
        .report_error(&json!({"subject": "crash", "body": "stack"}), "fingerid-cli")
        .await
        .unwrap();
    assert_eq!(message, "Thanks for your report");
}

#[tokio::test]
async fn report_refused_is_not_an_error() {
    let ctx = TestContext::new().await;
    ctx.mount_json(
        "POST",
        "/webapi/report.json",
        200,
        json!({"success": false, "message": "mail server down"}),
    )
    .await;

    let message = ctx.client.report_error(&json!({}), "x").await.unwrap();
    assert_eq!(message, "mail server down");
}

#[tokio::test]
async fn report_rejected_status() {
    let ctx = TestContext::new().await;
    ctx.mount_json("POST", "/webapi/report.json", 502, json!({})).await;

    let err = ctx.client.report_error(&json!({}), "x").await.unwrap_err();
    assert!(matches!(err, ClientError::Submission { status: 502, .. }));
}

// ============================================================================
// Compound download
// ============================================================================

#[tokio::test]
async fn compounds_are_parsed_and_cached() {
    let ctx = TestContext::new().await;
    let records: Vec<serde_json::Value> = (0..5_000)
        .map(|i| json!({"inchikey": format!("KEY{:05}", i), "mass": 180.06 + i as f64}))
        .collect();
    let body = serde_json::to_vec(&json!({"compounds": records})).unwrap();
    Mock::given(method("GET"))
        .and(path("/webapi/compounds/bio/C6H12O6.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("C6H12O6.json.gz");
    let parsed = ctx.client.compounds_for("C6H12O6", true, &cache).await.unwrap();

    assert_eq!(parsed.len(), 5_000);
    assert_eq!(parsed[4_999].inchikey.as_deref(), Some("KEY04999"));
    assert_eq!(read_gzip(&cache), body);
}

#[tokio::test]
async fn compounds_cache_survives_parse_error() {
    let ctx = TestContext::new().await;
    let mut body = br#"[{"inchikey": "A"}, {"inchikey": "B"} "#.to_vec();
    body.extend_from_slice(&vec![b'#'; 2 * 1024 * 1024]);
    Mock::given(method("GET"))
        .and(path("/webapi/compounds/not-bio/C2H6O.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&ctx.server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("C2H6O.json.gz");
    let err = ctx.client.compounds_for("C2H6O", false, &cache).await.unwrap_err();

    assert!(matches!(err, ClientError::MalformedResponse { .. }), "{:?}", err);
    assert_eq!(read_gzip(&cache), body);
}

#[tokio::test]
async fn compounds_error_status_writes_no_cache() {
    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/compounds/bio/Xx.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&ctx.server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("Xx.json.gz");
    let err = ctx.client.compounds_for("Xx", true, &cache).await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 404, .. }));
    assert!(!cache.exists());
}

// ============================================================================
// Connectivity
// ============================================================================

#[tokio::test]
async fn probe_reachable_service() {
    let ctx = TestContext::new().await;
    // Unmatched requests get a 404, which still proves reachability
    assert!(ctx.client.is_connected().await);
    assert_eq!(ctx.client.transport().generation(), 1);
}

#[tokio::test]
async fn probe_unreachable_service_reconnects_once() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = FingerIdClient::new(SharedNetworkConfig::new(config_for(&format!("http://{}", addr))))
        .unwrap();
    assert!(!client.is_connected().await);
    assert_eq!(client.transport().generation(), 2);

    let err = client.submit_job(&request()).await.unwrap_err();
    assert!(err.is_connectivity(), "{:?}", err);
}

#[tokio::test]
async fn reconnect_waits_for_in_flight_request() {
    use std::time::Duration;
    use tokio::time::Instant;

    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/version.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "SIRIUS GUI": {"version": "1.0.0", "date": "2026-01-01"},
                    "database": {"version": "db-1"}
                }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&ctx.server)
        .await;

    let in_flight = {
        let client = Arc::clone(&ctx.client);
        tokio::spawn(async move {
            let info = client.version_info().await;
            (info, Instant::now())
        })
    };

    // Wait until the slow request has reached the server and holds its lease
    while ctx.server.received_requests().await.unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let reconnecting = {
        let client = Arc::clone(&ctx.client);
        tokio::spawn(async move {
            assert!(client.transport().reconnect().await);
            Instant::now()
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!reconnecting.is_finished(), "reconnect must wait for the lease");
    assert_eq!(ctx.client.transport().generation(), 1);

    let (info, answered_at) = in_flight.await.unwrap();
    assert_eq!(info.unwrap().database_version, "db-1");

    let reconnected_at = reconnecting.await.unwrap();
    assert!(reconnected_at >= answered_at);
    assert_eq!(ctx.client.transport().generation(), 2);

    // The fresh client serves the next request
    let info = ctx.client.version_info().await.unwrap();
    assert_eq!(info.database_version, "db-1");
}

#[tokio::test]
async fn requests_queued_behind_reconnect_use_the_new_client() {
    use std::time::Duration;

    let ctx = TestContext::new().await;
    Mock::given(method("GET"))
        .and(path("/webapi/version.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "SIRIUS GUI": {"version": "1.0.0", "date": "2026-01-01"},
                    "database": {"version": "db-1"}
                }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&ctx.server)
        .await;

    let first = {
        let client = Arc::clone(&ctx.client);
        tokio::spawn(async move { client.version_info().await })
    };
    while ctx.server.received_requests().await.unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let reconnecting = {
        let client = Arc::clone(&ctx.client);
        tokio::spawn(async move { client.transport().reconnect().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A writer is queued, so this lease waits for the new client
    let second = {
        let client = Arc::clone(&ctx.client);
        tokio::spawn(async move {
            let lease = client.transport().lease().await;
            let generation = client.transport().generation();
            drop(lease);
            generation
        })
    };

    first.await.unwrap().unwrap();
    assert!(reconnecting.await.unwrap());
    assert_eq!(second.await.unwrap(), 2);
}
