//! End-to-end tests for the feedback pipeline.
//!
//! The real HTTP clients talk to an in-process fake of both the analysis
//! service and the learning platform, served by axum on an ephemeral port.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use feedbot::comments::CommentCorpus;
use feedbot::config::Config;
use feedbot::error::JobError;
use feedbot::handler::{JobHandler, JobOutcome, SkipReason, Stage};
use feedbot::queue::{run_worker, JobMessage, WorkerSummary};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};

// ─── Fake services ──────────────────────────────────────────────────

#[derive(Clone)]
struct FakeServices {
    /// Raw JSON bodies so file order survives the round trip.
    solutions: Arc<Mutex<HashMap<String, String>>>,
    analysis_status: Arc<Mutex<u16>>,
    analysis_body: Arc<Mutex<String>>,
    analysis_requests: Arc<Mutex<Vec<(String, Value)>>>,
    comments: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeServices {
    fn new() -> Self {
        Self {
            solutions: Arc::new(Mutex::new(HashMap::new())),
            analysis_status: Arc::new(Mutex::new(200)),
            analysis_body: Arc::new(Mutex::new(r#"{"results":[]}"#.to_string())),
            analysis_requests: Arc::new(Mutex::new(Vec::new())),
            comments: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn add_solution(&self, id: &str, body: &str) {
        self.solutions
            .lock()
            .unwrap()
            .insert(id.to_string(), body.to_string());
    }

    fn respond_with(&self, status: u16, body: &str) {
        *self.analysis_status.lock().unwrap() = status;
        *self.analysis_body.lock().unwrap() = body.to_string();
    }

    fn analysis_requests(&self) -> Vec<(String, Value)> {
        self.analysis_requests.lock().unwrap().clone()
    }

    fn comments(&self) -> Vec<(String, Value)> {
        self.comments.lock().unwrap().clone()
    }
}

async fn analyze(
    State(fake): State<FakeServices>,
    Path(track): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    fake.analysis_requests.lock().unwrap().push((track, body));
    let status = *fake.analysis_status.lock().unwrap();
    let body = fake.analysis_body.lock().unwrap().clone();
    (StatusCode::from_u16(status).unwrap(), body)
}

async fn solution(
    State(fake): State<FakeServices>,
    Path(id): Path<String>,
) -> Result<String, StatusCode> {
    fake.solutions
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn comment(
    State(fake): State<FakeServices>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    fake.comments.lock().unwrap().push((id, body));
    StatusCode::CREATED
}

async fn spawn_fake(fake: FakeServices) -> String {
    let app = Router::new()
        .route("/analyze/{track}", post(analyze))
        .route("/api/v1/solutions/{id}", get(solution))
        .route("/api/v1/solutions/{id}/comments", post(comment))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}

// ─── Helpers ────────────────────────────────────────────────────────

const UNUSED_VARIABLE: &str = "Consider removing unused variables.";

struct Harness {
    _tmp: TempDir,
    fake: FakeServices,
    handler: Arc<JobHandler>,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let smell_dir = tmp.path().join("comments").join("ruby").join("smell");
    fs::create_dir_all(&smell_dir).unwrap();
    fs::write(smell_dir.join("unused_variable.md"), UNUSED_VARIABLE).unwrap();

    let fake = FakeServices::new();
    let base = spawn_fake(fake.clone()).await;

    let config: Config = toml::from_str(&format!(
        r#"
[comments]
root = "{}"
track = "ruby"

[analysis]
host = "{base}"
timeout_secs = 5

[platform]
base_url = "{base}/"
token_env = "FEEDBOT_PIPELINE_TEST_TOKEN"
timeout_secs = 5

[worker]
concurrency = 2
call_timeout_secs = 10
"#,
        tmp.path().join("comments").display(),
    ))
    .unwrap();
    feedbot::config::validate(&config).unwrap();

    let corpus = Arc::new(CommentCorpus::from_config(&config.comments).unwrap());
    let handler = Arc::new(JobHandler::from_config(&config, corpus).unwrap());

    Harness {
        _tmp: tmp,
        fake,
        handler,
    }
}

async fn process(handler: &JobHandler, id: &str) -> JobOutcome {
    handler
        .process_with_rng(&JobMessage::for_submission(id), &mut StdRng::seed_from_u64(1))
        .await
}

/// A queue source whose connection drops after the buffered lines.
struct BrokenPipe;

impl AsyncRead for BrokenPipe {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "queue connection lost",
        )))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_end_to_end_publishes_comment() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(
        200,
        r#"{"results":[{"type":"smell","keys":["unused_variable"]}],"error":""}"#,
    );

    let outcome = process(&h.handler, "abc123").await;

    assert!(outcome.is_published(), "{}", outcome);
    assert_eq!(
        h.fake.analysis_requests(),
        vec![("ruby".to_string(), json!({ "code": "code" }))]
    );
    assert_eq!(
        h.fake.comments(),
        vec![("abc123".to_string(), json!({ "comment": UNUSED_VARIABLE }))]
    );
}

#[tokio::test]
async fn test_files_joined_in_document_order() {
    let h = harness().await;
    h.fake.add_solution(
        "multi",
        r#"{"track_id":"ruby","files":{"zeta.rb":"first","alpha.rb":"second"}}"#,
    );

    let outcome = process(&h.handler, "multi").await;

    assert!(matches!(
        outcome,
        JobOutcome::Skipped {
            reason: SkipReason::NoResults,
            ..
        }
    ));
    assert_eq!(
        h.fake.analysis_requests(),
        vec![("ruby".to_string(), json!({ "code": "first\nsecond" }))]
    );
}

#[tokio::test]
async fn test_unsupported_track_makes_no_analysis_call() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"python","files":{"solution.py":"code"}}"#,
    );
    h.fake.respond_with(
        200,
        r#"{"results":[{"type":"smell","keys":["unused_variable"]}]}"#,
    );

    let outcome = process(&h.handler, "abc123").await;

    assert!(matches!(
        outcome,
        JobOutcome::Skipped {
            reason: SkipReason::UnsupportedTrack(_),
            ..
        }
    ));
    assert!(h.fake.analysis_requests().is_empty());
    assert!(h.fake.comments().is_empty());
}

#[tokio::test]
async fn test_analysis_error_field_prevents_publish() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(200, r#"{"error":"timeout"}"#);

    let outcome = process(&h.handler, "abc123").await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            stage: Stage::Analyze,
            error: JobError::RemoteAnalysis(_),
            ..
        }
    ));
    assert!(h.fake.comments().is_empty());
}

#[tokio::test]
async fn test_unmatched_results_prevent_publish() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(
        200,
        r#"{"results":[{"type":"smell","keys":["shadowing"]},{"type":"style","keys":["tabs"]}]}"#,
    );

    let outcome = process(&h.handler, "abc123").await;

    assert!(matches!(
        outcome,
        JobOutcome::Skipped {
            reason: SkipReason::NoMatchingComment,
            ..
        }
    ));
    assert!(h.fake.comments().is_empty());
}

#[tokio::test]
async fn test_non_ok_status_is_transport_failure() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(503, "overloaded");

    let outcome = process(&h.handler, "abc123").await;

    match outcome {
        JobOutcome::Failed {
            stage: Stage::Analyze,
            error: JobError::Status { status, body, .. },
            ..
        } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected outcome: {}", other),
    }
    assert!(h.fake.comments().is_empty());
}

#[tokio::test]
async fn test_malformed_analysis_json() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(200, "<html>oops</html>");

    let outcome = process(&h.handler, "abc123").await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            stage: Stage::Analyze,
            error: JobError::Serialization(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_unknown_submission_is_not_found() {
    let h = harness().await;

    let outcome = process(&h.handler, "nope").await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            stage: Stage::Fetch,
            error: JobError::NotFound(_),
            ..
        }
    ));
    assert!(h.fake.analysis_requests().is_empty());
}

#[tokio::test]
async fn test_worker_processes_queue_lines() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.add_solution(
        "py-1",
        r#"{"track_id":"python","files":{"solution.py":"code"}}"#,
    );
    h.fake.respond_with(
        200,
        r#"{"results":[{"type":"smell","keys":["unused_variable"]}]}"#,
    );

    let input = concat!(
        "{\"jid\":\"1\",\"args\":[\"abc123\"]}\n",
        "\n",
        "{\"jid\":\"2\",\"args\":[\"py-1\"]}\n",
        "not json\n",
        "{\"jid\":\"3\",\"args\":[]}\n",
    );

    let summary = run_worker(h.handler.clone(), input.as_bytes(), 2)
        .await
        .unwrap();

    assert_eq!(
        summary,
        WorkerSummary {
            published: 1,
            skipped: 1,
            failed: 2,
        }
    );
    assert_eq!(h.fake.comments().len(), 1);
    assert_eq!(h.fake.analysis_requests().len(), 1);
}

#[tokio::test]
async fn test_worker_survives_non_utf8_line() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(
        200,
        r#"{"results":[{"type":"smell","keys":["unused_variable"]}]}"#,
    );

    let input: &[u8] = b"{\"args\":[\"abc123\"]}\n\xff\xfe garbage\n{\"args\":[\"abc123\"]}\n";
    let summary = run_worker(h.handler.clone(), input, 2).await.unwrap();

    assert_eq!(
        summary,
        WorkerSummary {
            published: 2,
            skipped: 0,
            failed: 1,
        }
    );
    assert_eq!(h.fake.comments().len(), 2);
}

#[tokio::test]
async fn test_worker_drains_jobs_when_queue_read_fails() {
    let h = harness().await;
    h.fake.add_solution(
        "abc123",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(
        200,
        r#"{"results":[{"type":"smell","keys":["unused_variable"]}]}"#,
    );

    let lines: &[u8] = b"{\"args\":[\"abc123\"]}\n";
    let reader = BufReader::new(lines.chain(BrokenPipe));
    let error = run_worker(h.handler.clone(), reader, 2).await.unwrap_err();

    assert!(
        format!("{:#}", error).contains("Failed to read job queue"),
        "{:#}",
        error
    );
    assert_eq!(
        h.fake.comments(),
        vec![("abc123".to_string(), json!({ "comment": UNUSED_VARIABLE }))]
    );
}

#[tokio::test]
async fn test_submission_id_cannot_escape_its_path_segment() {
    let h = harness().await;
    h.fake.add_solution(
        "victim",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(
        200,
        r#"{"results":[{"type":"smell","keys":["unused_variable"]}]}"#,
    );

    let outcome = process(&h.handler, "attacker/../victim").await;

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            stage: Stage::Fetch,
            error: JobError::NotFound(_),
            ..
        }
    ));
    assert!(h.fake.analysis_requests().is_empty());
    assert!(h.fake.comments().is_empty());
}

#[tokio::test]
async fn test_submission_id_with_reserved_characters_round_trips() {
    let h = harness().await;
    h.fake.add_solution(
        "team/42?draft",
        r#"{"track_id":"ruby","files":{"solution.src":"code"}}"#,
    );
    h.fake.respond_with(
        200,
        r#"{"results":[{"type":"smell","keys":["unused_variable"]}]}"#,
    );

    let outcome = process(&h.handler, "team/42?draft").await;

    assert!(outcome.is_published(), "{}", outcome);
    assert_eq!(
        h.fake.comments(),
        vec![("team/42?draft".to_string(), json!({ "comment": UNUSED_VARIABLE }))]
    );
}
