//! `coderisk-ingestd`: the batch-job entrypoint for a single ingestion run
//! (spec §6 "Exit codes (for batch jobs)").
//!
//! Grounded on `daemon::main`'s `#[tokio::main]` + `tracing_subscriber`
//! bootstrap, stripped of the daemon's long-lived socket-listener loop
//! since this binary runs one repo's pipeline to completion and exits.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use coderisk_core::config::Config;
use coderisk_core::store::StagingStore;
use coderisk_fetch::github::GithubClient;
use coderisk_fetch::rate_limiter::RateLimiter;
use coderisk_fetch::window::Window;
use coderisk_graph::projection::ConsistencyOutcome;
use coderisk_llm::NullLlmClient;
use coderisk_orchestrator::{CancellationToken, Orchestrator, StageOutcome};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "coderisk-ingestd", about = "Runs the CodeRisk ingestion pipeline for one repository")]
struct Args {
    /// Repository owner (spec §4.1).
    owner: String,
    /// Repository name (spec §4.1).
    name: String,
    /// Ingestion window: `all`, or a number of days (default 90, spec §4.1).
    #[arg(long, default_value = "90")]
    window: String,
}

fn parse_window(raw: &str) -> Window {
    if raw.eq_ignore_ascii_case("all") {
        Window::All
    } else {
        raw.parse().map(Window::LastDays).unwrap_or_default()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::from(2);
        }
    };

    let store = match StagingStore::open(&config.db_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, db_path = ?config.db_path, "failed to open staging store");
            return ExitCode::from(2);
        }
    };

    let limiter = Arc::new(RateLimiter::new(config.rate_limit_target_rps));
    let platform = Arc::new(GithubClient::new(config.platform_token.clone(), limiter));
    // The LLM provider itself is an external collaborator (spec.md §1); no
    // key configured degrades to `NullLlmClient` rather than failing the
    // run, matching spec §6's "Optional: LLM API key".
    let llm: Arc<dyn coderisk_llm::LlmClient> = Arc::new(NullLlmClient);

    let orchestrator = Orchestrator::new(store, platform, llm);
    let window = parse_window(&args.window);
    let report = orchestrator.run_repo(&args.owner, &args.name, window, CancellationToken::new()).await;

    info!(
        owner = %report.owner,
        name = %report.name,
        fetch = ?report.fetch,
        atomize = ?report.atomize,
        link = ?report.link,
        index = ?report.index,
        project = ?report.project,
        consistency = ?report.consistency,
        "ingestion run complete"
    );

    if report.is_success() {
        return ExitCode::from(0);
    }

    let any_failed = [&report.fetch, &report.atomize, &report.link, &report.index, &report.project]
        .into_iter()
        .any(|s| matches!(s, StageOutcome::Failed(_)));

    match (any_failed, report.consistency) {
        (true, _) | (_, Some(ConsistencyOutcome::Failure)) | (_, None) => ExitCode::from(2),
        (false, Some(ConsistencyOutcome::Warning)) => ExitCode::from(1),
        (false, Some(ConsistencyOutcome::Success)) => ExitCode::from(0),
    }
}
