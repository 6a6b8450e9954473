//! Commit Atomizer (spec §4.2): turns per-file patches into block-level
//! change events and maintains `code_blocks`/`code_block_modifications`.

pub mod apply;
pub mod atomizer;
pub mod diff;
pub mod error;

pub use atomizer::{atomize_commit, atomize_pending};
pub use error::{AtomizerError, Result};
