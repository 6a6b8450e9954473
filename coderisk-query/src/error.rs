use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Core(#[from] coderisk_core::CoderiskError),
    #[error(transparent)]
    Graph(#[from] coderisk_graph::GraphError),
}

pub type Result<T> = std::result::Result<T, QueryError>;
