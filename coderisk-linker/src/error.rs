use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkerError {
    #[error(transparent)]
    Core(#[from] coderisk_core::CoderiskError),
    #[error(transparent)]
    Llm(#[from] coderisk_llm::error::LlmError),
}

pub type Result<T> = std::result::Result<T, LinkerError>;

impl From<LinkerError> for coderisk_core::CoderiskError {
    fn from(e: LinkerError) -> Self {
        match e {
            LinkerError::Core(e) => e,
            LinkerError::Llm(e) => e.into(),
        }
    }
}
