use thiserror::Error;

#[derive(Error, Debug)]
pub enum AtomizerError {
    #[error(transparent)]
    Core(#[from] coderisk_core::CoderiskError),
    #[error(transparent)]
    Llm(#[from] coderisk_llm::error::LlmError),
}

pub type Result<T> = std::result::Result<T, AtomizerError>;

impl From<AtomizerError> for coderisk_core::CoderiskError {
    fn from(e: AtomizerError) -> Self {
        match e {
            AtomizerError::Core(e) => e,
            AtomizerError::Llm(e) => e.into(),
        }
    }
}
