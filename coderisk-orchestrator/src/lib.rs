//! The Orchestrator (spec §4.7, SPEC_FULL.md's `coderisk-orchestrator`
//! entry): sequences Platform Fetcher -> Commit Atomizer -> Issue Linker ->
//! Relationship Indexers -> Graph Projector for a repository, one repo at a
//! time, with checkpointing and cooperative cancellation; a [`WorkerPool`]
//! fans a batch run out across repos (spec §5: "across repos, no ordering
//! constraint").
//!
//! Grounded on the teacher's `daemon::background::background_indexing_task`
//! loop (interval + shutdown flag, one stage feeding the next) and
//! `daemon::main`'s tracing-subscriber bootstrap, generalized from a single
//! indexing pass into the five-stage pipeline spec §2 describes.

pub mod cancellation;
pub mod error;
pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use coderisk_core::checkpoint::Stage;
use coderisk_core::store::StagingStore;
use coderisk_core::CoderiskError;
use coderisk_fetch::platform::PlatformClient;
use coderisk_fetch::window::Window;
use coderisk_graph::projection::{ConsistencyOutcome, Mode};
use coderisk_llm::LlmClient;
use tracing::{error, info, warn};

pub use cancellation::CancellationToken;
pub use pool::{WorkerPool, DEFAULT_CONCURRENCY};

/// Per-workload transaction budgets (spec §5): ingestion is the coarsest
/// (minutes), atomization is per-batch, indexing/projection are in-process
/// SQL and stay well under a minute in practice but still get a ceiling so
/// a runaway repo can't hang the pool forever.
const FETCH_TIMEOUT: Duration = Duration::from_secs(600);
const ATOMIZE_TIMEOUT: Duration = Duration::from_secs(180);
const LINK_TIMEOUT: Duration = Duration::from_secs(180);
const INDEX_TIMEOUT: Duration = Duration::from_secs(60);
const PROJECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of a single stage within one repo's run.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage ran to completion; the payload is a short human-readable
    /// summary (row counts, event counts) for the operator's benefit.
    Completed(String),
    /// The stage didn't run because an earlier stage in this repo's run
    /// escalated or because the run was cancelled.
    Skipped,
    /// The stage failed. SS is left consistent (every writer in this
    /// pipeline commits per-row, not per-stage), but the pipeline does not
    /// proceed past it for this repo.
    Failed(String),
}

/// Full record of one repo's PF -> CA -> IL -> RI -> GP run, plus the
/// terminal graph-projection consistency check spec §4.7 calls for.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub owner: String,
    pub name: String,
    pub fetch: StageOutcome,
    pub atomize: StageOutcome,
    pub link: StageOutcome,
    pub index: StageOutcome,
    pub project: StageOutcome,
    pub consistency: Option<ConsistencyOutcome>,
}

impl RunReport {
    fn pending(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            fetch: StageOutcome::Skipped,
            atomize: StageOutcome::Skipped,
            link: StageOutcome::Skipped,
            index: StageOutcome::Skipped,
            project: StageOutcome::Skipped,
            consistency: None,
        }
    }

    /// True if every stage that ran succeeded and the final graph
    /// projection was fully consistent with the staging store.
    pub fn is_success(&self) -> bool {
        !self.any_failed() && matches!(self.consistency, Some(ConsistencyOutcome::Success))
    }

    /// True if no stage failed outright but the projection only reached
    /// the warning band (spec §4.5's 90-95% match ratio).
    pub fn is_warning(&self) -> bool {
        !self.any_failed() && matches!(self.consistency, Some(ConsistencyOutcome::Warning))
    }

    fn any_failed(&self) -> bool {
        [&self.fetch, &self.atomize, &self.link, &self.index, &self.project]
            .into_iter()
            .any(|s| matches!(s, StageOutcome::Failed(_)))
    }
}

/// Ties together the stage crates and the storage/collaborator handles
/// they need. Built once per process and shared (via `Arc`, where the
/// caller fans out across repos) rather than re-constructed per repo.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<StagingStore>,
    platform: Arc<dyn PlatformClient>,
    llm: Arc<dyn LlmClient>,
}

impl Orchestrator {
    pub fn new(store: Arc<StagingStore>, platform: Arc<dyn PlatformClient>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, platform, llm }
    }

    /// Fans `run_repo` out across many repos at once, bounded by `pool`
    /// (spec §5: "across repos, no ordering constraint"). Results come
    /// back in the same order as `repos`, not completion order.
    pub async fn run_many(
        &self,
        pool: &WorkerPool,
        repos: Vec<(String, String)>,
        window: Window,
        cancel: CancellationToken,
    ) -> Vec<RunReport> {
        let orchestrator = self.clone();
        pool.run_all(repos, move |(owner, name)| {
            let orchestrator = orchestrator.clone();
            let cancel = cancel.clone();
            async move { orchestrator.run_repo(&owner, &name, window, cancel).await }
        })
        .await
    }

    /// Runs the full PF -> CA -> IL -> RI -> GP sequence for one repo
    /// (spec §4.7). On any stage failure, subsequent stages are skipped
    /// for that repo but SS remains consistent — the run can be safely
    /// re-entered later since every stage checkpoints its own progress.
    pub async fn run_repo(&self, owner: &str, name: &str, window: Window, cancel: CancellationToken) -> RunReport {
        let mut report = RunReport::pending(owner, name);

        let repo_id = match self.run_fetch(owner, name, window, &mut report).await {
            Some(id) => id,
            None => return report,
        };

        if cancel.is_cancelled() {
            info!(owner, name, "cancelled before atomization");
            return report;
        }
        if !self.run_atomize(repo_id, &mut report).await {
            return report;
        }

        if cancel.is_cancelled() {
            info!(owner, name, "cancelled before linking");
            return report;
        }
        if !self.run_link(repo_id, &mut report).await {
            return report;
        }

        if cancel.is_cancelled() {
            info!(owner, name, "cancelled before indexing");
            return report;
        }
        if !self.run_index(repo_id, &mut report).await {
            return report;
        }

        if cancel.is_cancelled() {
            info!(owner, name, "cancelled before projection");
            return report;
        }
        self.run_project(repo_id, &mut report).await;

        report
    }

    async fn run_fetch(&self, owner: &str, name: &str, window: Window, report: &mut RunReport) -> Option<i64> {
        let fetch_result = tokio::time::timeout(
            FETCH_TIMEOUT,
            coderisk_fetch::fetcher::fetch_repo(&self.store, self.platform.as_ref(), owner, name, window),
        )
        .await;

        match fetch_result {
            Ok(Ok(fetched)) => {
                report.fetch = StageOutcome::Completed(format!(
                    "{} commits, {} PRs, {} issues, {} timeline events",
                    fetched.commits_ingested,
                    fetched.pull_requests_ingested,
                    fetched.issues_ingested,
                    fetched.timeline_events_ingested
                ));
                // `upsert_repository` is a MERGE on `(owner, name)` (see
                // `coderisk_core::store`), so re-running it here to recover
                // the id `fetch_repo` resolved internally is a no-op write,
                // not a second ingestion pass.
                match self.platform.default_branch(owner, name).await {
                    Ok(branch) => match self.store.upsert_repository(owner, name, &branch) {
                        Ok(id) => Some(id),
                        Err(e) => {
                            report.fetch = StageOutcome::Failed(e.to_string());
                            None
                        }
                    },
                    Err(e) => {
                        let err: CoderiskError = e.into();
                        report.fetch = StageOutcome::Failed(err.to_string());
                        None
                    }
                }
            }
            Ok(Err(e)) => {
                let err: CoderiskError = e.into();
                self.record_failure(owner, name, "fetch", &err, &mut report.fetch);
                None
            }
            Err(_) => {
                self.record_failure(owner, name, "fetch", &CoderiskError::Timeout("fetch".into()), &mut report.fetch);
                None
            }
        }
    }

    async fn run_atomize(&self, repo_id: i64, report: &mut RunReport) -> bool {
        let result = tokio::time::timeout(
            ATOMIZE_TIMEOUT,
            coderisk_atomizer::atomize_pending(&self.store, self.llm.as_ref(), repo_id),
        )
        .await;

        match result {
            Ok(Ok(events)) => {
                report.atomize = StageOutcome::Completed(format!("{events} change events"));
                true
            }
            Ok(Err(e)) => {
                let err: CoderiskError = e.into();
                self.record_stage_failure(repo_id, "atomize", &err, &mut report.atomize)
            }
            Err(_) => {
                self.record_stage_failure(repo_id, "atomize", &CoderiskError::Timeout("atomize".into()), &mut report.atomize)
            }
        }
    }

    async fn run_link(&self, repo_id: i64, report: &mut RunReport) -> bool {
        let result =
            tokio::time::timeout(LINK_TIMEOUT, coderisk_linker::link_repo(&self.store, self.llm.as_ref(), repo_id)).await;

        match result {
            Ok(Ok(links)) => {
                report.link = StageOutcome::Completed(format!("{links} references linked"));
                true
            }
            Ok(Err(e)) => {
                let err: CoderiskError = e.into();
                self.record_stage_failure(repo_id, "link", &err, &mut report.link)
            }
            Err(_) => self.record_stage_failure(repo_id, "link", &CoderiskError::Timeout("link".into()), &mut report.link),
        }
    }

    /// Runs the three relationship indexers (spec §4.4) and, since none of
    /// them self-checkpoints, writes the `Index` checkpoint at the
    /// orchestrator level once all three have run.
    async fn run_index(&self, repo_id: i64, report: &mut RunReport) -> bool {
        let store = self.store.clone();
        let incident_result = tokio::time::timeout(INDEX_TIMEOUT, async { coderisk_indexers::incident::run(&store, repo_id) }).await;
        let incidents = match incident_result {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return self.record_stage_failure(repo_id, "index:incident", &e.into(), &mut report.index),
            Err(_) => {
                return self.record_stage_failure(
                    repo_id,
                    "index:incident",
                    &CoderiskError::Timeout("index:incident".into()),
                    &mut report.index,
                )
            }
        };

        let store = self.store.clone();
        let ownership_result = tokio::time::timeout(INDEX_TIMEOUT, async { coderisk_indexers::ownership::run(&store, repo_id) }).await;
        let owners = match ownership_result {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return self.record_stage_failure(repo_id, "index:ownership", &e.into(), &mut report.index),
            Err(_) => {
                return self.record_stage_failure(
                    repo_id,
                    "index:ownership",
                    &CoderiskError::Timeout("index:ownership".into()),
                    &mut report.index,
                )
            }
        };

        let store = self.store.clone();
        let coupling_result = tokio::time::timeout(INDEX_TIMEOUT, async { coderisk_indexers::coupling::run(&store, repo_id) }).await;
        let coupled = match coupling_result {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return self.record_stage_failure(repo_id, "index:coupling", &e.into(), &mut report.index),
            Err(_) => {
                return self.record_stage_failure(
                    repo_id,
                    "index:coupling",
                    &CoderiskError::Timeout("index:coupling".into()),
                    &mut report.index,
                )
            }
        };

        // None of the three indexers self-checkpoints (confirmed: they
        // have no cursor concept of their own, unlike PF/CA/IL), so the
        // orchestrator records re-entry progress for the whole stage.
        if let Err(e) = self.store.set_checkpoint(repo_id, Stage::Index, &chrono::Utc::now().to_rfc3339()) {
            return self.record_stage_failure(repo_id, "index", &e, &mut report.index);
        }

        report.index = StageOutcome::Completed(format!("{incidents} incidents, {owners} ownership rows, {coupled} coupling pairs"));
        true
    }

    async fn run_project(&self, repo_id: i64, report: &mut RunReport) {
        let store = self.store.clone();
        let result = tokio::time::timeout(PROJECT_TIMEOUT, async { coderisk_graph::projection::project_repo(&store, repo_id, Mode::Incremental) }).await;

        match result {
            Ok(Ok(projection)) => {
                report.project = StageOutcome::Completed(format!(
                    "{} nodes, {} edges written",
                    projection.nodes_written, projection.edges_written
                ));
            }
            Ok(Err(e)) => {
                let err: CoderiskError = e.into();
                self.record_stage_failure(repo_id, "project", &err, &mut report.project);
                return;
            }
            Err(_) => {
                self.record_stage_failure(repo_id, "project", &CoderiskError::Timeout("project".into()), &mut report.project);
                return;
            }
        }

        // Validate-mode pass to produce the terminal consistency verdict
        // the batch binary's exit code depends on (spec §4.5/§6).
        match coderisk_graph::projection::validate_consistency(&self.store, repo_id) {
            Ok(consistency) => report.consistency = Some(consistency.outcome),
            Err(e) => {
                warn!(repo_id, error = %e, "post-projection consistency check failed to run");
                report.consistency = Some(ConsistencyOutcome::Failure);
            }
        }
    }

    fn record_failure(&self, owner: &str, name: &str, stage: &str, err: &CoderiskError, slot: &mut StageOutcome) {
        error!(owner, name, stage, error = %err, policy = ?err.policy(), "stage failed");
        *slot = StageOutcome::Failed(err.to_string());
    }

    /// Applies spec §7's policy to a stage-level failure and returns
    /// whether the pipeline should continue to the next stage. Only
    /// `Escalate` stops a repo's run outright; the other policies are
    /// item-level concerns the stage crates themselves already applied
    /// before ever returning an `Err` up to the orchestrator.
    fn record_stage_failure(&self, repo_id: i64, stage: &str, err: &CoderiskError, slot: &mut StageOutcome) -> bool {
        let policy = err.policy();
        error!(repo_id, stage, error = %err, ?policy, "stage failed");
        *slot = StageOutcome::Failed(err.to_string());
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderisk_fetch::fixture::FixtureClient;
    use coderisk_llm::NullLlmClient;

    fn orchestrator() -> Orchestrator {
        let store = Arc::new(StagingStore::open_in_memory().unwrap());
        let platform: Arc<dyn PlatformClient> = Arc::new(FixtureClient::sample());
        let llm: Arc<dyn LlmClient> = Arc::new(NullLlmClient);
        Orchestrator::new(store, platform, llm)
    }

    #[tokio::test]
    async fn full_run_completes_every_stage_and_reaches_a_consistency_verdict() {
        let orchestrator = orchestrator();
        let report = orchestrator.run_repo("acme", "widgets", Window::All, CancellationToken::new()).await;

        assert!(matches!(report.fetch, StageOutcome::Completed(_)), "fetch: {:?}", report.fetch);
        assert!(matches!(report.atomize, StageOutcome::Completed(_)), "atomize: {:?}", report.atomize);
        assert!(matches!(report.link, StageOutcome::Completed(_)), "link: {:?}", report.link);
        assert!(matches!(report.index, StageOutcome::Completed(_)), "index: {:?}", report.index);
        assert!(matches!(report.project, StageOutcome::Completed(_)), "project: {:?}", report.project);
        assert!(report.consistency.is_some());
    }

    #[tokio::test]
    async fn cancelling_before_a_stage_skips_the_rest_of_the_run() {
        let orchestrator = orchestrator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator.run_repo("acme", "widgets", Window::All, cancel).await;

        assert!(matches!(report.fetch, StageOutcome::Completed(_)));
        assert_eq!(report.atomize, StageOutcome::Skipped);
        assert_eq!(report.link, StageOutcome::Skipped);
        assert_eq!(report.index, StageOutcome::Skipped);
        assert_eq!(report.project, StageOutcome::Skipped);
        assert!(report.consistency.is_none());
    }

    #[tokio::test]
    async fn run_many_preserves_repo_order_across_the_pool() {
        let orchestrator = orchestrator();
        let pool = WorkerPool::new(2);
        let repos = vec![
            ("acme".to_string(), "widgets".to_string()),
            ("acme".to_string(), "gadgets".to_string()),
        ];

        let reports = orchestrator.run_many(&pool, repos, Window::All, CancellationToken::new()).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].name, "widgets");
        assert_eq!(reports[1].name, "gadgets");
    }
}
