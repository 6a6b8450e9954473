//! End-to-end exercise of the Orchestrator's public API against an
//! in-memory staging store and fixture collaborators — no network, no real
//! LLM provider (spec §4.7's PF -> CA -> IL -> RI -> GP sequence).

use std::sync::Arc;

use coderisk_core::store::StagingStore;
use coderisk_fetch::fixture::FixtureClient;
use coderisk_fetch::platform::PlatformClient;
use coderisk_fetch::window::Window;
use coderisk_llm::fixture::FixtureLlmClient;
use coderisk_llm::types::{ChangeEvent, ChangeEventKind};
use coderisk_llm::LlmClient;
use coderisk_orchestrator::{CancellationToken, Orchestrator, StageOutcome};

fn seeded_orchestrator() -> Orchestrator {
    let store = Arc::new(StagingStore::open_in_memory().unwrap());
    let platform: Arc<dyn PlatformClient> = Arc::new(FixtureClient::sample());

    // `FixtureClient::sample()` ships one commit touching `src/auth.rs`
    // with message "Fix authentication timeout bug (#127)" — feed the LLM
    // fixture a matching change event so atomization actually produces a
    // code block for the later stages to index and project.
    let llm_fixture = FixtureLlmClient::new().with_change_events(
        "deadbeef",
        vec![ChangeEvent {
            commit_sha: "deadbeef".to_string(),
            kind: ChangeEventKind::AddBlock,
            file_path: "src/auth.rs".to_string(),
            block_name: "refresh_token".to_string(),
            block_type: Some("function".to_string()),
            start_line: Some(1),
            end_line: Some(3),
            dependency_path: None,
            previous_block_name: None,
        }],
    );
    let llm: Arc<dyn LlmClient> = Arc::new(llm_fixture);

    Orchestrator::new(store, platform, llm)
}

#[tokio::test]
async fn ingests_atomizes_links_indexes_and_projects_a_repo() {
    let orchestrator = seeded_orchestrator();

    let report = orchestrator.run_repo("acme", "widgets", Window::All, CancellationToken::new()).await;

    assert!(matches!(report.fetch, StageOutcome::Completed(_)));
    assert!(matches!(report.atomize, StageOutcome::Completed(_)));
    assert!(matches!(report.link, StageOutcome::Completed(_)));
    assert!(matches!(report.index, StageOutcome::Completed(_)));
    assert!(matches!(report.project, StageOutcome::Completed(_)));
    assert!(report.is_success() || report.is_warning(), "unexpected consistency: {:?}", report.consistency);
}

#[tokio::test]
async fn re_entering_a_completed_run_is_safe() {
    let orchestrator = seeded_orchestrator();
    let first = orchestrator.run_repo("acme", "widgets", Window::All, CancellationToken::new()).await;
    assert!(first.is_success() || first.is_warning());

    // Spec §4.7 "may be re-entered safely": running again over the same
    // already-ingested repo must not fail or double-count.
    let second = orchestrator.run_repo("acme", "widgets", Window::All, CancellationToken::new()).await;
    assert!(matches!(second.fetch, StageOutcome::Completed(_)));
    assert!(second.is_success() || second.is_warning());
}
