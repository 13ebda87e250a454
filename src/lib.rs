//! # feedbot
//!
//! A background job handler that gives automated feedback on code
//! submissions.
//!
//! For every submission id taken off the queue, feedbot fetches the source
//! from the learning platform, sends it to a static-analysis service, picks
//! one pre-authored comment matching a detected smell, and posts it into the
//! learner's conversation thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌─────────┐
//! │  Queue  │──▶│  Fetch   │──▶│ Analyze  │──▶│  Select  │──▶│ Publish │
//! │ message │   │ platform │   │ service  │   │  corpus  │   │ comment │
//! └─────────┘   └──────────┘   └──────────┘   └──────────┘   └─────────┘
//! ```
//!
//! Any stage may end the job early; the learner either receives exactly one
//! comment or none.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Submissions, analysis payloads, smell identifiers |
//! | [`comments`] | Authored comment corpus |
//! | [`analysis`] | Static-analysis service client |
//! | [`platform`] | Learning platform client |
//! | [`selector`] | Randomized comment selection |
//! | [`handler`] | Per-job pipeline |
//! | [`queue`] | Queue messages and worker runner |
//! | [`traits`] | Collaborator and reporting seams |
//! | [`error`] | Job error taxonomy |

pub mod analysis;
pub mod comments;
pub mod config;
pub mod error;
pub mod handler;
pub mod models;
pub mod platform;
pub mod queue;
pub mod selector;
pub mod traits;
