use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication invalid")]
    AuthInvalid,
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;

impl From<FetchError> for coderisk_core::CoderiskError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Transport(m) => coderisk_core::CoderiskError::TransportError(m),
            FetchError::AuthInvalid => coderisk_core::CoderiskError::AuthInvalid,
            FetchError::RateLimited(m) => coderisk_core::CoderiskError::RateLimited(m),
            FetchError::NotFound(m) => coderisk_core::CoderiskError::NotFound(m),
            FetchError::SchemaMismatch(m) => coderisk_core::CoderiskError::SchemaMismatch(m),
        }
    }
}

impl From<coderisk_core::CoderiskError> for FetchError {
    fn from(e: coderisk_core::CoderiskError) -> Self {
        match e {
            coderisk_core::CoderiskError::TransportError(m) => FetchError::Transport(m),
            coderisk_core::CoderiskError::AuthInvalid => FetchError::AuthInvalid,
            coderisk_core::CoderiskError::RateLimited(m) => FetchError::RateLimited(m),
            coderisk_core::CoderiskError::NotFound(m) => FetchError::NotFound(m),
            coderisk_core::CoderiskError::SchemaMismatch(m) => FetchError::SchemaMismatch(m),
            other => FetchError::Transport(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            FetchError::Transport(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}
