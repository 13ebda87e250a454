//! Per-submission job pipeline.
//!
//! ```text
//! Receive ─▶ Fetch ─▶ TrackFilter ─▶ Analyze ─▶ Select ─▶ Publish
//!    │         │          │            │          │          │
//!    └─────────┴──────────┴─────┬──────┴──────────┴──────────┘
//!                               ▼
//!                     Skipped / Failed (terminal)
//! ```
//!
//! Every stage handles its own failure: the job stops, one [`JobOutcome`] is
//! reported, and nothing is retried. At most one comment is published per
//! job.

use anyhow::Result as AnyResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{join_sources, AnalysisClient};
use crate::comments::CommentCorpus;
use crate::config::Config;
use crate::error::{JobError, Result};
use crate::models::SmellId;
use crate::platform::PlatformClient;
use crate::queue::JobMessage;
use crate::selector::{first_match, flatten, shuffle};
use crate::traits::{Analyzer, CommentPublisher, JobReporter, SolutionFetcher, TracingReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Receive,
    Fetch,
    TrackFilter,
    Analyze,
    Select,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Receive => "receive",
            Stage::Fetch => "fetch",
            Stage::TrackFilter => "track-filter",
            Stage::Analyze => "analyze",
            Stage::Select => "select",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Expected reasons for a job to end without a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedTrack(String),
    NoResults,
    NoMatchingComment,
}

impl SkipReason {
    pub fn stage(&self) -> Stage {
        match self {
            SkipReason::UnsupportedTrack(_) => Stage::TrackFilter,
            SkipReason::NoResults => Stage::Analyze,
            SkipReason::NoMatchingComment => Stage::Select,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedTrack(track) => write!(f, "track '{}' is not supported", track),
            SkipReason::NoResults => f.write_str("analysis returned no results"),
            SkipReason::NoMatchingComment => f.write_str("no comment matches the detected smells"),
        }
    }
}

/// Terminal state of one job.
#[derive(Debug)]
pub enum JobOutcome {
    Published {
        submission_id: String,
        smell: SmellId,
    },
    Skipped {
        submission_id: String,
        reason: SkipReason,
    },
    Failed {
        submission_id: Option<String>,
        stage: Stage,
        error: JobError,
    },
}

impl JobOutcome {
    fn skipped(submission_id: &str, reason: SkipReason) -> Self {
        JobOutcome::Skipped {
            submission_id: submission_id.to_string(),
            reason,
        }
    }

    fn failed(submission_id: Option<&str>, stage: Stage, error: JobError) -> Self {
        JobOutcome::Failed {
            submission_id: submission_id.map(str::to_string),
            stage,
            error,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, JobOutcome::Published { .. })
    }

    pub fn submission_id(&self) -> Option<&str> {
        match self {
            JobOutcome::Published { submission_id, .. }
            | JobOutcome::Skipped { submission_id, .. } => Some(submission_id),
            JobOutcome::Failed { submission_id, .. } => submission_id.as_deref(),
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Published {
                submission_id,
                smell,
            } => write!(f, "{}: published comment for {}", submission_id, smell),
            JobOutcome::Skipped {
                submission_id,
                reason,
            } => write!(f, "{}: skipped ({})", submission_id, reason),
            JobOutcome::Failed {
                submission_id,
                stage,
                error,
            } => write!(
                f,
                "{}: failed at {} ({})",
                submission_id.as_deref().unwrap_or("<unknown>"),
                stage,
                error
            ),
        }
    }
}

/// Runs the feedback pipeline for submissions delivered by the queue.
///
/// Cheap to share: wrap it in an `Arc` and call [`process`](Self::process)
/// from as many workers as needed. The only shared state is the read-only
/// corpus; each job draws from its own random generator.
pub struct JobHandler {
    track: String,
    corpus: Arc<CommentCorpus>,
    fetcher: Arc<dyn SolutionFetcher>,
    analyzer: Arc<dyn Analyzer>,
    publisher: Arc<dyn CommentPublisher>,
    reporter: Arc<dyn JobReporter>,
    call_timeout: Option<Duration>,
}

impl JobHandler {
    pub fn new(
        track: impl Into<String>,
        corpus: Arc<CommentCorpus>,
        fetcher: Arc<dyn SolutionFetcher>,
        analyzer: Arc<dyn Analyzer>,
        publisher: Arc<dyn CommentPublisher>,
    ) -> Self {
        Self {
            track: track.into(),
            corpus,
            fetcher,
            analyzer,
            publisher,
            reporter: Arc::new(TracingReporter),
            call_timeout: None,
        }
    }

    /// Wire the HTTP collaborators described by `config`.
    pub fn from_config(config: &Config, corpus: Arc<CommentCorpus>) -> AnyResult<Self> {
        let platform = Arc::new(PlatformClient::new(&config.platform)?);
        let analysis = Arc::new(AnalysisClient::new(&config.analysis)?);

        Ok(Self::new(
            config.comments.track.clone(),
            corpus,
            platform.clone(),
            analysis,
            platform,
        )
        .with_call_timeout(config.worker.call_timeout()))
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn JobReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_call_timeout(mut self, limit: Duration) -> Self {
        self.call_timeout = Some(limit);
        self
    }

    /// Process one queue message with a freshly seeded generator.
    pub async fn process(&self, message: &JobMessage) -> JobOutcome {
        let mut rng = StdRng::from_entropy();
        self.process_with_rng(message, &mut rng).await
    }

    pub async fn process_with_rng<R: Rng + Send>(
        &self,
        message: &JobMessage,
        rng: &mut R,
    ) -> JobOutcome {
        let outcome = match message.submission_id() {
            Ok(submission_id) => self.run(submission_id, rng).await,
            Err(error) => JobOutcome::failed(None, Stage::Receive, error),
        };
        self.reporter.finished(&outcome);
        outcome
    }

    /// Report a message that could not even be decoded.
    pub fn reject(&self, error: JobError) -> JobOutcome {
        let outcome = JobOutcome::failed(None, Stage::Receive, error);
        self.reporter.finished(&outcome);
        outcome
    }

    async fn run<R: Rng + Send>(&self, submission_id: &str, rng: &mut R) -> JobOutcome {
        let submission = match self
            .bounded(Stage::Fetch, self.fetcher.fetch_solution(submission_id))
            .await
        {
            Ok(submission) => submission,
            Err(error) => return JobOutcome::failed(Some(submission_id), Stage::Fetch, error),
        };

        if submission.track_id != self.track {
            return JobOutcome::skipped(
                submission_id,
                SkipReason::UnsupportedTrack(submission.track_id),
            );
        }

        let code = join_sources(&submission.files);
        let payload = match self
            .bounded(
                Stage::Analyze,
                self.analyzer.analyze(&submission.track_id, &code),
            )
            .await
        {
            Ok(payload) => payload,
            Err(error) => return JobOutcome::failed(Some(submission_id), Stage::Analyze, error),
        };

        if let Some(complaint) = payload.rejection() {
            return JobOutcome::failed(
                Some(submission_id),
                Stage::Analyze,
                JobError::RemoteAnalysis(complaint.to_string()),
            );
        }
        if payload.results.is_empty() {
            return JobOutcome::skipped(submission_id, SkipReason::NoResults);
        }

        let mut smells = flatten(&payload.results);
        for smell in &smells {
            self.reporter.smell_detected(submission_id, smell);
        }
        shuffle(&mut smells, rng);

        let Some(selection) = first_match(&self.corpus, &smells) else {
            return JobOutcome::skipped(submission_id, SkipReason::NoMatchingComment);
        };

        match self
            .bounded(
                Stage::Publish,
                self.publisher
                    .submit_comment(selection.comment.as_bytes(), submission_id),
            )
            .await
        {
            Ok(()) => JobOutcome::Published {
                submission_id: submission_id.to_string(),
                smell: selection.smell.clone(),
            },
            Err(error) => JobOutcome::failed(Some(submission_id), Stage::Publish, error),
        }
    }

    async fn bounded<T>(&self, stage: Stage, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| JobError::Timeout {
                    stage,
                    after: limit,
                })?,
            None => call.await,
        }
    }
}
