//! Platform Fetcher (spec §4.1): ingests hosting-platform data into the
//! staging store with rate-limit discipline and incremental re-entry.

pub mod error;
pub mod fetcher;
pub mod fixture;
pub mod github;
pub mod platform;
pub mod rate_limiter;
pub mod types;
pub mod window;

pub mod prelude {
    pub use crate::error::{FetchError, Result};
    pub use crate::fetcher::{fetch_repo, FetchReport};
    pub use crate::github::GithubClient;
    pub use crate::platform::{Page, PlatformClient};
    pub use crate::rate_limiter::RateLimiter;
    pub use crate::window::Window;
}
