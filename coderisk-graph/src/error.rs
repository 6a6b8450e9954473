use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Core(#[from] coderisk_core::CoderiskError),
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl From<GraphError> for coderisk_core::CoderiskError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Core(e) => e,
        }
    }
}
