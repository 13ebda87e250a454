//! HTTP client for the learning platform.
//!
//! Implements both platform-facing contracts used by the handler:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | [`SolutionFetcher`] | `GET {base_url}/api/v1/solutions/{id}` |
//! | [`CommentPublisher`] | `POST {base_url}/api/v1/solutions/{id}/comments` with `{"comment": "..."}` |
//!
//! When the environment variable named by `platform.token_env` is set, every
//! request carries it as a bearer token.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;

use crate::config::PlatformConfig;
use crate::error::{JobError, Result};
use crate::models::Submission;
use crate::traits::{CommentPublisher, SolutionFetcher};

#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build platform HTTP client")?;

        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty());

        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid platform base URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Platform base URL cannot carry a path: {}", config.base_url);
        }

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// `{base_url}/api/v1/solutions/{id}` followed by `extra` segments.
    ///
    /// The id is pushed as a single percent-encoded segment, so `/`, `?` or
    /// `#` inside it cannot address another resource.
    fn solution_url(&self, submission_id: &str, extra: &[&str]) -> Result<Url> {
        if matches!(submission_id, "" | "." | "..") {
            return Err(JobError::Argument(format!(
                "'{}' cannot be used as a submission id",
                submission_id
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| JobError::Transport(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "solutions", submission_id])
            .extend(extra);
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn read_body(url: &Url, response: reqwest::Response) -> Result<(StatusCode, String)> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| JobError::Transport(format!("reading response from {} failed: {}", url, e)))?;
    Ok((status, body))
}

#[async_trait]
impl SolutionFetcher for PlatformClient {
    async fn fetch_solution(&self, submission_id: &str) -> Result<Submission> {
        let url = self.solution_url(submission_id, &[])?;

        let response = self
            .authorized(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| JobError::Transport(format!("request to {} failed: {}", url, e)))?;

        let (status, body) = read_body(&url, response).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(JobError::NotFound(submission_id.to_string()));
        }
        if !status.is_success() {
            return Err(JobError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let mut submission: Submission = serde_json::from_str(&body)?;
        submission.id = submission_id.to_string();
        Ok(submission)
    }
}

#[async_trait]
impl CommentPublisher for PlatformClient {
    async fn submit_comment(&self, content: &[u8], submission_id: &str) -> Result<()> {
        let url = self.solution_url(submission_id, &["comments"])?;
        let body = serde_json::json!({
            "comment": String::from_utf8_lossy(content),
        });

        let response = self
            .authorized(self.client.post(url.clone()))
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::Transport(format!("request to {} failed: {}", url, e)))?;

        let (status, body) = read_body(&url, response).await?;
        if !status.is_success() {
            return Err(JobError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
