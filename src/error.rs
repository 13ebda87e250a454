use std::time::Duration;
use thiserror::Error;

use crate::handler::Stage;

/// Failures that abort a single job.
///
/// None of these cross a job boundary: [`JobHandler`](crate::handler::JobHandler)
/// turns each one into a [`JobOutcome::Failed`](crate::handler::JobOutcome::Failed).
#[derive(Error, Debug)]
pub enum JobError {
    #[error("unable to determine submission id: {0}")]
    Argument(String),

    #[error("submission {0} not found")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{url} responded with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("malformed JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("analysis service rejected the submission: {0}")]
    RemoteAnalysis(String),

    #[error("{stage} did not finish within {after:?}")]
    Timeout { stage: Stage, after: Duration },
}

pub type Result<T> = std::result::Result<T, JobError>;
