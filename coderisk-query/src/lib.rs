//! Query Engine (spec §4.6): answers "what is the risk of changing this
//! file (or blocks within it)?" by reading the graph projection primarily,
//! falling back to the staging store when the projection is degraded.

pub mod error;
pub mod path;
pub mod query;
pub mod scoring;
pub mod types;

pub use error::{QueryError, Result};
pub use query::query;
pub use types::{BlockEvidence, Consistency, QueryOptions, QueryRequest, QueryResponse};
