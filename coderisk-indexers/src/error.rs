use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error(transparent)]
    Core(#[from] coderisk_core::CoderiskError),
}

pub type Result<T> = std::result::Result<T, IndexerError>;

impl From<IndexerError> for coderisk_core::CoderiskError {
    fn from(e: IndexerError) -> Self {
        match e {
            IndexerError::Core(e) => e,
        }
    }
}
