//! Review backend entrypoint.
//!
//! Wires configuration into the services and exposes the two core
//! operations as subcommands:
//!
//! - `index`  — index a repository checkout for a branch
//! - `review` — run a multi-stage review from a JSON request file
//!
//! All configuration comes from the environment (`.env` supported); see
//! the crate-level configs for the recognized variables.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use llm_gateway::LlmServiceProfiles;
use llm_gateway::config::default_config::profiles_from_env;
use rag_engine::locks::ProjectLocks;
use rag_engine::{Indexer, QdrantFacade, RagConfig, Retriever};
use review_pipeline::stages::DEFAULT_MAX_PARALLEL_STAGE_1;
use review_pipeline::{EventSink, ReviewDeps, ReviewEvent, ReviewRequest, orchestrate_review};

#[derive(Parser)]
#[command(name = "review-ai-backend", about = "AI code review with a code-aware retrieval index")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a repository checkout for one branch.
    Index {
        /// Path to the repository working tree.
        repo_path: PathBuf,
        #[arg(long)]
        workspace: String,
        #[arg(long)]
        project: String,
        #[arg(long)]
        branch: String,
        #[arg(long, default_value = "HEAD")]
        commit: String,
        /// Extra exclude patterns (repeatable).
        #[arg(long = "exclude")]
        excludes: Vec<String>,
    },
    /// Run a review from a JSON request file.
    Review {
        /// Path to a ReviewRequest JSON document.
        request: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env when present.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let (fast, slow, embedding) = profiles_from_env().context("LLM configuration")?;
    let llm = Arc::new(LlmServiceProfiles::new(fast, slow, embedding));

    let rag_cfg = RagConfig::from_env().context("RAG configuration")?;
    let facade = Arc::new(QdrantFacade::new(&rag_cfg)?);
    let locks = Arc::new(ProjectLocks::new());
    let indexer = Arc::new(Indexer::new(
        rag_cfg.clone(),
        facade.clone(),
        llm.clone(),
        locks,
    ));
    let retriever = Arc::new(Retriever::new(rag_cfg, facade, llm.clone()));

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    match cli.command {
        Command::Index {
            repo_path,
            workspace,
            project,
            branch,
            commit,
            excludes,
        } => {
            let stats = indexer
                .index_repository(
                    &repo_path, &workspace, &project, &branch, &commit, &excludes, &cancel,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Command::Review { request } => {
            let raw = tokio::fs::read_to_string(&request)
                .await
                .with_context(|| format!("reading {}", request.display()))?;
            let request: ReviewRequest =
                serde_json::from_str(&raw).context("parsing review request")?;

            let max_parallel = std::env::var("REVIEW_MAX_PARALLEL")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(DEFAULT_MAX_PARALLEL_STAGE_1);

            let mut deps = ReviewDeps::new(llm)
                .with_retriever(retriever)
                .with_indexer(indexer);
            deps.max_parallel_stage_1 = max_parallel;

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let progress = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        ReviewEvent::Status { state, message } => info!(state = %state, "{message}"),
                        ReviewEvent::Progress { percent, message } => {
                            info!(percent, "{message}")
                        }
                        ReviewEvent::Error { message } => warn!("{message}"),
                        ReviewEvent::Final { .. } => {}
                    }
                }
            });

            let outcome =
                orchestrate_review(&deps, &request, &EventSink::new(tx), &cancel).await?;
            progress.await.ok();

            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}
