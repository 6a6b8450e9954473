//! Errors surfaced by an `LlmClient` implementer, narrow enough that a
//! concrete provider can map its own HTTP/parse errors onto it without
//! leaking transport details into `coderisk-atomizer`/`coderisk-linker`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("the model emitted malformed or internally inconsistent output: {0}")]
    ValidationFailed(String),
    #[error("provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

impl From<LlmError> for coderisk_core::CoderiskError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimited(m) => coderisk_core::CoderiskError::RateLimited(m),
            LlmError::Transport(m) => coderisk_core::CoderiskError::TransportError(m),
            LlmError::ValidationFailed(m) => coderisk_core::CoderiskError::ValidationFailed(m),
            LlmError::Provider(m) => coderisk_core::CoderiskError::InternalError(m),
        }
    }
}
