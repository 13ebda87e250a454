//! # feedbot CLI
//!
//! The `feedbot` binary runs the feedback job handler and offers a few
//! commands for comment authors.
//!
//! ## Usage
//!
//! ```bash
//! feedbot --config ./config/feedbot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `feedbot comments` | List every smell identifier that has an authored comment |
//! | `feedbot process <id>` | Run the pipeline for a single submission |
//! | `feedbot work` | Process queue messages (one JSON object per line) from stdin |
//! | `feedbot analyze <files>...` | Dry run: analyze local files and show the comment that would be posted |
//!
//! Log verbosity is controlled with `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use feedbot::analysis::{join_sources, AnalysisClient};
use feedbot::comments::CommentCorpus;
use feedbot::config::{self, Config};
use feedbot::handler::JobHandler;
use feedbot::models::SubmissionFile;
use feedbot::queue::{run_worker, JobMessage};
use feedbot::selector::{flatten, select};
use feedbot::traits::Analyzer;

/// feedbot: automated feedback on code submissions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/feedbot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "feedbot",
    about = "feedbot: posts one authored comment per analyzed code submission",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/feedbot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the authored comment identifiers for the configured track.
    Comments,

    /// Run the full pipeline for one submission.
    ///
    /// Fetches the submission, analyzes it and publishes at most one comment.
    Process {
        /// Submission id.
        submission_id: String,

        /// Seed for comment selection (random when omitted).
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Process queue messages read from stdin.
    ///
    /// Each line is a JSON object such as `{"jid": "...", "args": ["<submission id>"]}`.
    Work {
        /// Number of jobs processed at once. Overrides `worker.concurrency`.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Analyze local files without publishing anything.
    ///
    /// Prints the detected smells and the comment that would be selected.
    Analyze {
        /// Source files, joined in the order given.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Track to analyze as. Defaults to `comments.track`.
        #[arg(long)]
        track: Option<String>,

        /// Seed for comment selection (random when omitted).
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_corpus(cfg: &Config) -> Result<Arc<CommentCorpus>> {
    let corpus = CommentCorpus::from_config(&cfg.comments)?;
    if corpus.is_empty() {
        tracing::warn!(
            root = %corpus.root().display(),
            "comment corpus is empty, no comment will ever be published"
        );
    }
    tracing::info!(
        root = %corpus.root().display(),
        comments = corpus.len(),
        "comment corpus ready"
    );
    Ok(Arc::new(corpus))
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

async fn run_process(cfg: &Config, submission_id: &str, seed: Option<u64>) -> Result<()> {
    let handler = JobHandler::from_config(cfg, load_corpus(cfg)?)?;
    let outcome = handler
        .process_with_rng(&JobMessage::for_submission(submission_id), &mut rng_from(seed))
        .await;
    println!("{}", outcome);
    Ok(())
}

async fn run_work(cfg: &Config, concurrency: Option<usize>) -> Result<()> {
    let concurrency = concurrency.unwrap_or(cfg.worker.concurrency);
    if concurrency == 0 {
        bail!("--concurrency must be >= 1");
    }

    let handler = Arc::new(JobHandler::from_config(cfg, load_corpus(cfg)?)?);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let summary = run_worker(handler, stdin, concurrency).await?;

    println!("processed: {}", summary.total());
    println!("  published: {}", summary.published);
    println!("  skipped: {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    Ok(())
}

fn run_comments(cfg: &Config) -> Result<()> {
    let corpus = CommentCorpus::from_config(&cfg.comments)?;
    for id in corpus.ids() {
        println!("{}", id);
    }
    println!("{} comments in {}", corpus.len(), corpus.root().display());
    Ok(())
}

async fn run_analyze(
    cfg: &Config,
    files: &[PathBuf],
    track: Option<&str>,
    seed: Option<u64>,
) -> Result<()> {
    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        sources.push(SubmissionFile {
            filename: path.display().to_string(),
            content,
        });
    }

    let corpus = CommentCorpus::from_config(&cfg.comments)?;
    let client = AnalysisClient::new(&cfg.analysis)?;
    let track = track.unwrap_or(&cfg.comments.track);

    let payload = client.analyze(track, &join_sources(&sources)).await?;
    if let Some(complaint) = payload.rejection() {
        bail!("analysis service rejected the input: {}", complaint);
    }

    let smells = flatten(&payload.results);
    println!("detected smells: {}", smells.len());
    for smell in &smells {
        let marker = if corpus.contains(smell) { "*" } else { " " };
        println!("  {} {}", marker, smell);
    }

    match select(&corpus, &payload.results, &mut rng_from(seed)) {
        Some(selection) => {
            println!();
            println!("selected: {}", selection.smell);
            println!("{}", selection.comment.to_text());
        }
        None => println!("no comment would be posted"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Comments => run_comments(&cfg)?,
        Commands::Process {
            submission_id,
            seed,
        } => run_process(&cfg, &submission_id, seed).await?,
        Commands::Work { concurrency } => run_work(&cfg, concurrency).await?,
        Commands::Analyze { files, track, seed } => {
            run_analyze(&cfg, &files, track.as_deref(), seed).await?
        }
    }

    Ok(())
}
