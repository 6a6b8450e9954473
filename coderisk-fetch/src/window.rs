//! Ingestion window (spec §4.1 "Window options: last-N-days, or `all`.
//! Default 90 days.").

use chrono::{DateTime, Duration, Utc};

use crate::error::{FetchError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
    LastDays(u32),
    All,
}

impl Window {
    /// `owner`/`name` non-empty and window >= 1 day are the PF contract's
    /// input constraints (spec §4.1).
    pub fn validate(self) -> Result<Self> {
        if let Window::LastDays(n) = self {
            if n < 1 {
                return Err(FetchError::SchemaMismatch("window must be >= 1 day".into()));
            }
        }
        Ok(self)
    }

    /// Lower bound to fetch from, or `None` for `All`.
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Window::LastDays(n) => Some(now - Duration::days(n as i64)),
            Window::All => None,
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Window::LastDays(90)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_day_window_is_rejected() {
        assert!(Window::LastDays(0).validate().is_err());
    }

    #[test]
    fn default_window_is_ninety_days() {
        assert_eq!(Window::default(), Window::LastDays(90));
    }

    #[test]
    fn all_window_has_no_lower_bound() {
        assert_eq!(Window::All.since(Utc::now()), None);
    }
}
