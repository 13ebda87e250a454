//! Client for the static-analysis service.
//!
//! The service is opaque: it receives a submission's source as one blob and
//! answers with the smells it found.
//!
//! ```text
//! POST {host}/analyze/{track}      {"code": "<joined source>"}
//! 200 OK                           {"results": [{"type": "...", "keys": ["..."]}], "error": "..."}
//! ```
//!
//! Any status other than `200` is a transport failure. A non-empty `error`
//! field is returned as part of the payload; interpreting it is up to the
//! caller.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

use crate::config::AnalysisConfig;
use crate::error::{JobError, Result};
use crate::models::{AnalysisPayload, SubmissionFile};
use crate::traits::Analyzer;

#[derive(Serialize)]
struct CodeBody<'a> {
    code: &'a str,
}

/// Join submission files into a single blob, in order, separated by a newline.
///
/// The service is not told where one file ends and the next begins.
pub fn join_sources(files: &[SubmissionFile]) -> String {
    files
        .iter()
        .map(|f| f.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: reqwest::Client,
    host: String,
}

impl AnalysisClient {
    pub fn new(config: &AnalysisConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build analysis HTTP client")?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, track_id: &str) -> String {
        format!("{}/analyze/{}", self.host, track_id)
    }
}

#[async_trait]
impl Analyzer for AnalysisClient {
    async fn analyze(&self, track_id: &str, code: &str) -> Result<AnalysisPayload> {
        let url = self.endpoint(track_id);

        let response = self
            .client
            .post(&url)
            .json(&CodeBody { code })
            .send()
            .await
            .map_err(|e| JobError::Transport(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| JobError::Transport(format!("reading response from {} failed: {}", url, e)))?;

        if status != StatusCode::OK {
            return Err(JobError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
