//! Seams between the job handler and its collaborators.
//!
//! The handler only talks to the outside world through these traits, so the
//! HTTP implementations in [`platform`](crate::platform) and
//! [`analysis`](crate::analysis) can be swapped for in-memory fakes.
//!
//! ```text
//!             ┌──────────────────────────────┐
//!  queue ───▶ │          JobHandler          │
//!             └──┬─────────┬──────────┬──────┘
//!                ▼         ▼          ▼
//!        SolutionFetcher Analyzer CommentPublisher
//!                          │
//!                          ▼
//!                    JobReporter (logging)
//! ```

use async_trait::async_trait;

use crate::error::{JobError, Result};
use crate::handler::{JobOutcome, SkipReason};
use crate::models::{AnalysisPayload, SmellId, Submission};

// ═══════════════════════════════════════════════════════════════════════
// Platform
// ═══════════════════════════════════════════════════════════════════════

/// Retrieves a submission from the learning platform.
#[async_trait]
pub trait SolutionFetcher: Send + Sync {
    /// Fails with [`JobError::NotFound`] for unknown ids and with a transport
    /// error for anything else that goes wrong.
    async fn fetch_solution(&self, submission_id: &str) -> Result<Submission>;
}

/// Posts a comment into a submission's conversation thread.
#[async_trait]
pub trait CommentPublisher: Send + Sync {
    async fn submit_comment(&self, content: &[u8], submission_id: &str) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Analysis
// ═══════════════════════════════════════════════════════════════════════

/// Runs static analysis over a submission's joined source.
///
/// Implementations return the payload as the service produced it; the
/// handler decides what an `error` field or an empty result list means.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, track_id: &str, code: &str) -> Result<AnalysisPayload>;
}

// ═══════════════════════════════════════════════════════════════════════
// Reporting
// ═══════════════════════════════════════════════════════════════════════

/// Receives structured events from the job handler.
///
/// The handler never logs on its own. Every job reports exactly one
/// [`JobOutcome`] through [`finished`](JobReporter::finished).
pub trait JobReporter: Send + Sync {
    /// Called once per flattened smell, before selection.
    fn smell_detected(&self, _submission_id: &str, _smell: &SmellId) {}

    fn finished(&self, outcome: &JobOutcome);
}

/// Default reporter that emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl JobReporter for TracingReporter {
    fn smell_detected(&self, submission_id: &str, smell: &SmellId) {
        tracing::debug!(submission_id, smell = %smell, "smell detected");
    }

    fn finished(&self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Published {
                submission_id,
                smell,
            } => {
                tracing::info!(submission_id = %submission_id, smell = %smell, "comment published");
            }
            JobOutcome::Skipped {
                submission_id,
                reason,
            } => match reason {
                SkipReason::UnsupportedTrack(track) => {
                    tracing::debug!(submission_id = %submission_id, track = %track, "skipping unsupported track");
                }
                SkipReason::NoResults => {
                    tracing::debug!(submission_id = %submission_id, "analysis found nothing to comment on");
                }
                SkipReason::NoMatchingComment => {
                    tracing::debug!(submission_id = %submission_id, "no authored comment for detected smells");
                }
            },
            JobOutcome::Failed {
                submission_id,
                stage,
                error: error @ JobError::RemoteAnalysis(_),
            } => {
                tracing::warn!(submission_id = ?submission_id, stage = %stage, error = %error, "analysis service complained");
            }
            JobOutcome::Failed {
                submission_id,
                stage,
                error,
            } => {
                tracing::error!(submission_id = ?submission_id, stage = %stage, error = %error, "job aborted");
            }
        }
    }
}
