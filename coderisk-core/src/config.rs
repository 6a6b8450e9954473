//! Typed configuration (spec §6 "Environment configuration", SPEC_FULL.md §D).
//!
//! A single `Config` struct built once and passed by reference/`Arc` into
//! every component's constructor — no ambient global config state (spec §9
//! "Global configuration" redesign note). Layered in the order spec §6
//! mandates: environment variable, then an OS credential store (best
//! effort), then a TOML config file, then a `.env` file as the CI fallback.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoderiskError, Result};

/// Default history window, in days, for the Platform Fetcher (spec §4.1).
pub const DEFAULT_WINDOW_DAYS: u32 = 90;

/// Default target request rate, in requests/second (spec §4.1: ~86% of a
/// 5,000/hour primary quota).
pub const DEFAULT_RATE_TARGET_RPS: f64 = 1.18;

/// Default bounded connection-pool size for the staging store (spec §5).
pub const DEFAULT_SS_POOL_SIZE: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hosting-platform access token. Required.
    pub platform_token: String,
    /// LLM provider API key. Optional — absence degrades to `NullLlmClient`.
    pub llm_api_key: Option<String>,
    /// LLM provider selector (e.g. `"anthropic"`, `"openai-compatible"`).
    pub llm_provider: Option<String>,
    /// Bounded connection pool size for the staging store.
    pub ss_pool_size: u32,
    /// Target platform request rate, requests/second.
    pub rate_limit_target_rps: f64,
    /// History window, in days, for ingestion (spec §4.1).
    pub history_window_days: u32,
    /// Path to the staging-store SQLite database file.
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform_token: String::new(),
            llm_api_key: None,
            llm_provider: None,
            ss_pool_size: DEFAULT_SS_POOL_SIZE,
            rate_limit_target_rps: DEFAULT_RATE_TARGET_RPS,
            history_window_days: DEFAULT_WINDOW_DAYS,
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".coderisk").join("coderisk.db"))
        .unwrap_or_else(|| PathBuf::from("/tmp/.coderisk/coderisk.db"))
}

fn config_file_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".coderisk").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("/tmp/.coderisk/config.toml"))
}

/// On-disk TOML shape for `~/.coderisk/config.toml`; every field optional
/// since the environment/credential-store layers may already have supplied
/// it (spec §6's layered secrets retrieval order).
#[derive(Debug, Default, Deserialize, Serialize)]
struct FileConfig {
    platform_token: Option<String>,
    llm_api_key: Option<String>,
    llm_provider: Option<String>,
    ss_pool_size: Option<u32>,
    rate_limit_target_rps: Option<f64>,
    history_window_days: Option<u32>,
    db_path: Option<PathBuf>,
}

impl Config {
    /// Build a `Config` following spec §6's layered retrieval order:
    /// env var -> OS credential store (best-effort, not implemented here
    /// beyond the env-var fallback it would normally front) -> TOML config
    /// file -> `.env` file (dotenvy, parsed last so it never overrides an
    /// already-set process env var).
    pub fn load() -> Result<Self> {
        // dotenvy only fills in variables not already present in the
        // process environment, so it is safe to call before reading env
        // vars below; this realizes the "dotenv as CI fallback" ordering.
        let _ = dotenvy::dotenv();

        let mut config = Self::default();

        if let Some(file) = Self::read_file(&config_file_path()) {
            config.apply_file(file);
        }

        config.apply_env();

        if config.platform_token.is_empty() {
            return Err(CoderiskError::AuthInvalid);
        }
        Ok(config)
    }

    fn read_file(path: &Path) -> Option<FileConfig> {
        let content = std::fs::read_to_string(path).ok()?;
        toml::from_str(&content).ok()
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.platform_token {
            self.platform_token = v;
        }
        if let Some(v) = file.llm_api_key {
            self.llm_api_key = Some(v);
        }
        if let Some(v) = file.llm_provider {
            self.llm_provider = Some(v);
        }
        if let Some(v) = file.ss_pool_size {
            self.ss_pool_size = v;
        }
        if let Some(v) = file.rate_limit_target_rps {
            self.rate_limit_target_rps = v;
        }
        if let Some(v) = file.history_window_days {
            self.history_window_days = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
    }

    /// Environment variables take priority over the TOML file, matching
    /// spec §6's "environment variable -> ... -> config file" order.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("CODERISK_PLATFORM_TOKEN") {
            if !v.is_empty() {
                self.platform_token = v;
            }
        }
        if let Ok(v) = std::env::var("CODERISK_LLM_API_KEY") {
            self.llm_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("CODERISK_LLM_PROVIDER") {
            self.llm_provider = Some(v);
        }
        if let Ok(v) = std::env::var("CODERISK_SS_POOL_SIZE") {
            if let Ok(n) = v.parse() {
                self.ss_pool_size = n;
            }
        }
        if let Ok(v) = std::env::var("CODERISK_RATE_TARGET_RPS") {
            if let Ok(n) = v.parse() {
                self.rate_limit_target_rps = n;
            }
        }
        if let Ok(v) = std::env::var("CODERISK_WINDOW_DAYS") {
            if let Ok(n) = v.parse() {
                self.history_window_days = n;
            }
        }
        if let Ok(v) = std::env::var("CODERISK_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.history_window_days, DEFAULT_WINDOW_DAYS);
        assert!((config.rate_limit_target_rps - DEFAULT_RATE_TARGET_RPS).abs() < f64::EPSILON);
        assert_eq!(config.ss_pool_size, DEFAULT_SS_POOL_SIZE);
    }

    #[test]
    fn file_config_layers_over_default_without_clobbering_unset_fields() {
        let mut config = Config::default();
        config.apply_file(FileConfig {
            platform_token: Some("tok".to_string()),
            llm_api_key: None,
            llm_provider: Some("anthropic".to_string()),
            ss_pool_size: None,
            rate_limit_target_rps: None,
            history_window_days: Some(30),
            db_path: None,
        });
        assert_eq!(config.platform_token, "tok");
        assert_eq!(config.llm_provider.as_deref(), Some("anthropic"));
        assert_eq!(config.history_window_days, 30);
        assert_eq!(config.ss_pool_size, DEFAULT_SS_POOL_SIZE);
    }
}
