//! Orchestrator error handling: every stage crate's error already converts
//! into [`coderisk_core::CoderiskError`] (see each crate's `error.rs`), so
//! the orchestrator works exclusively in that one taxonomy and applies
//! spec §7's retry/drop/quarantine/escalate policy via
//! [`coderisk_core::error::Policy`].

pub use coderisk_core::error::Policy;
pub use coderisk_core::{CoderiskError as OrchestratorError, Result};
