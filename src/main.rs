//! mcp-orch: run the generate → validate → update workflow from the shell.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_orchestrator::{Orchestrator, RunControl};

#[derive(Debug, Parser)]
#[command(name = "mcp-orch", version, about = "Feature workflow orchestration over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate, validate and publish one feature
    Run {
        /// Repository root
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Markdown file describing the feature
        #[arg(long)]
        feature: PathBuf,
        /// Feature slug; the target branch is derived from it
        #[arg(long)]
        slug: String,
        /// Base branch (defaults to `workflow.base_branch`)
        #[arg(long)]
        base: Option<String>,
        /// Abandon the run after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// List configured MCP endpoints
    Endpoints {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },
}

/// Initialize logging with RUST_LOG environment variable support
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();

    match Cli::parse().command {
        Command::Run {
            repo,
            feature,
            slug,
            base,
            deadline_secs,
        } => {
            let orchestrator = Arc::new(Orchestrator::load(&repo)?);
            let feature_md = std::fs::read_to_string(&feature)
                .with_context(|| format!("reading feature description {}", feature.display()))?;
            let task = orchestrator.task(&repo, feature_md, &slug, base.as_deref())?;

            let mut control = RunControl::new();
            if let Some(secs) = deadline_secs {
                control = control.with_timeout(Duration::from_secs(secs));
            }
            let token = control.cancellation_token().clone();

            tracing::info!("Starting run for {} in {:?}", slug, repo);
            let mut handle = tokio::task::spawn_blocking({
                let orchestrator = Arc::clone(&orchestrator);
                move || orchestrator.run(&task, &control)
            });

            // Run with Ctrl+C signal handling
            let result = tokio::select! {
                res = &mut handle => res?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, cancelling run");
                    token.cancel();
                    handle.await?
                }
            };

            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Endpoints { repo } => {
            let orchestrator = Orchestrator::load(&repo)?;
            for name in orchestrator.registry().names() {
                let Some(endpoint) = orchestrator.registry().lookup(name) else {
                    continue;
                };
                let config = endpoint.config();
                println!("{:<12} {} {}", name, config.command, config.args.join(" "));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
