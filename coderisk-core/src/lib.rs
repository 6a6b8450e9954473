//! Shared data model, staging-store schema, configuration and error
//! taxonomy for the CodeRisk ingestion and linking pipeline.

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{CoderiskError, Result};

pub mod prelude {
    pub use crate::batch::BatchMap;
    pub use crate::config::Config;
    pub use crate::error::{CoderiskError, Result};
    pub use crate::store::StagingStore;
    pub use crate::types::*;
}
