//! Risk Indexers (spec §4.4): three idempotent batch passes over the
//! staging store — incident index, ownership/familiarity, coupling.

pub mod coupling;
pub mod error;
pub mod incident;
pub mod ownership;

pub use error::{IndexerError, Result};
