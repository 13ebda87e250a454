//! Queue messages and a line-delimited worker runner.
//!
//! Messages use the Sidekiq-style envelope `{"jid": "...", "args": ["<submission id>"]}`.
//! [`run_worker`] feeds one message per line to a shared [`JobHandler`],
//! keeping up to `concurrency` jobs in flight. Acknowledgement and retry are
//! left to whatever queue transport produces the lines.

use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{JobError, Result};
use crate::handler::{JobHandler, JobOutcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl JobMessage {
    pub fn for_submission(submission_id: &str) -> Self {
        Self {
            jid: None,
            args: vec![Value::String(submission_id.to_string())],
        }
    }

    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// The submission id carried in the first argument.
    pub fn submission_id(&self) -> Result<&str> {
        match self.args.first() {
            Some(Value::String(id)) if !id.trim().is_empty() => Ok(id),
            Some(Value::String(_)) => Err(JobError::Argument("submission id is empty".to_string())),
            Some(other) => Err(JobError::Argument(format!(
                "expected a string submission id, got {}",
                other
            ))),
            None => Err(JobError::Argument("message has no arguments".to_string())),
        }
    }
}

/// Tally of job outcomes for one worker run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl WorkerSummary {
    pub fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Published { .. } => self.published += 1,
            JobOutcome::Skipped { .. } => self.skipped += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.published + self.skipped + self.failed
    }
}

/// Process every message read from `reader` until EOF.
///
/// Blank lines are ignored. Lines that are not valid UTF-8 or not valid
/// messages are reported through the handler as receive failures without
/// touching the network. Jobs already in flight are always awaited, even when
/// reading the queue fails.
pub async fn run_worker<R>(
    handler: Arc<JobHandler>,
    mut reader: R,
    concurrency: usize,
) -> AnyResult<WorkerSummary>
where
    R: AsyncBufRead + Unpin,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut jobs = JoinSet::new();
    let mut summary = WorkerSummary::default();
    let mut buf = Vec::new();
    let mut stopped = None;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                stopped = Some(anyhow::Error::new(e).context("Failed to read job queue"));
                break;
            }
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                summary.record(&handler.reject(JobError::Argument(format!(
                    "message is not valid UTF-8: {}",
                    e
                ))));
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let message = match JobMessage::parse(line) {
            Ok(message) => message,
            Err(error) => {
                summary.record(&handler.reject(error));
                continue;
            }
        };

        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                stopped = Some(anyhow::Error::new(e).context("Worker semaphore closed"));
                break;
            }
        };
        let handler = handler.clone();
        jobs.spawn(async move {
            let outcome = handler.process(&message).await;
            drop(permit);
            outcome
        });

        while let Some(done) = jobs.try_join_next() {
            record_joined(&mut summary, done);
        }
    }

    while let Some(done) = jobs.join_next().await {
        record_joined(&mut summary, done);
    }

    tracing::info!(
        published = summary.published,
        skipped = summary.skipped,
        failed = summary.failed,
        "worker finished"
    );

    match stopped {
        Some(error) => Err(error),
        None => Ok(summary),
    }
}

/// A job task that panicked or was cancelled counts as failed.
fn record_joined(
    summary: &mut WorkerSummary,
    done: std::result::Result<JobOutcome, tokio::task::JoinError>,
) {
    match done {
        Ok(outcome) => summary.record(&outcome),
        Err(e) => {
            tracing::error!(error = %e, "job task did not complete");
            summary.failed += 1;
        }
    }
}
