//! Clipcast configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration, loaded from ~/.clipcast/config.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClipcastConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub stages: StagesConfig,
}

impl ClipcastConfig {
    /// Load config from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::ClipcastError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::ClipcastError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Clipcast home directory (~/.clipcast).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".clipcast")
    }
}

/// Relational store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.clipcast/clipcast.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

/// Telegram decision-channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Chat that receives review requests and decision buttons.
    #[serde(default)]
    pub review_chat_id: i64,
    /// Server-side long-poll wait, seconds.
    #[serde(default = "default_poll_wait")]
    pub poll_wait_secs: u64,
    /// Backoff after a transient polling error, seconds.
    #[serde(default = "default_poll_backoff")]
    pub poll_backoff_secs: u64,
    /// Process lock path guarding exclusive channel consumption.
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
}

fn default_poll_wait() -> u64 {
    30
}
fn default_poll_backoff() -> u64 {
    5
}
fn default_lock_path() -> String {
    "~/.clipcast/approver.lock".into()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            review_chat_id: 0,
            poll_wait_secs: default_poll_wait(),
            poll_backoff_secs: default_poll_backoff(),
            lock_path: default_lock_path(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the timer registry is rebuilt from the account store.
    #[serde(default = "default_refresh_secs")]
    pub refresh_interval_secs: u64,
    /// Circuit-breaker ceiling for consecutive account failures.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

fn default_refresh_secs() -> u64 {
    3600
}
fn default_max_failures() -> u32 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_secs(),
            max_failures: default_max_failures(),
        }
    }
}

/// Review wait configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// "detached" (return after pending_review) or "poll".
    #[serde(default = "default_review_mode")]
    pub mode: String,
    #[serde(default = "default_review_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_review_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_review_mode() -> String {
    "detached".into()
}
fn default_review_poll_secs() -> u64 {
    30
}
fn default_review_timeout_secs() -> u64 {
    3600
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            mode: default_review_mode(),
            poll_interval_secs: default_review_poll_secs(),
            timeout_secs: default_review_timeout_secs(),
        }
    }
}

/// Endpoints for the external stage collaborators. Empty URL = stage
/// not configured; the pipeline refuses to start without all five.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StagesConfig {
    #[serde(default)]
    pub idea_url: String,
    #[serde(default)]
    pub prompts_url: String,
    #[serde(default)]
    pub videos_url: String,
    #[serde(default)]
    pub compose_url: String,
    #[serde(default)]
    pub publish_url: String,
}
