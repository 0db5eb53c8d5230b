//! Record types shared across the store, scheduler, pipeline, and gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::status::ContentStatus;

/// One tenant: platform credentials, posting schedule, quota and
/// failure counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub slug: String,
    pub display_name: String,
    /// Opaque platform token; refreshed by an external collaborator.
    pub access_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub posting_schedule: PostingSchedule,
    pub is_active: bool,
    pub consecutive_failures: u32,
    pub last_post_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Circuit breaker: accounts at or past the failure ceiling are
    /// excluded from scheduling until a success clears the counter.
    pub fn is_tripped(&self, max_failures: u32) -> bool {
        self.consecutive_failures >= max_failures
    }
}

/// Per-account posting schedule, persisted as JSON on the account row.
/// Field names follow the stored wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingSchedule {
    /// Local times of day, "HH:MM".
    pub posting_times: Vec<String>,
    /// Weekday subset, 0 = Sunday .. 6 = Saturday. None means every day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_days: Option<Vec<u8>>,
    /// IANA timezone name, e.g. "America/New_York".
    pub timezone: String,
    pub posts_per_day: u32,
}

impl Default for PostingSchedule {
    fn default() -> Self {
        Self {
            posting_times: vec!["09:00".into()],
            active_days: None,
            timezone: "UTC".into(),
            posts_per_day: 1,
        }
    }
}

/// One content item moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: String,
    pub account_id: String,
    pub status: ContentStatus,
    pub idea: Option<String>,
    /// Final composed artifact.
    pub video_path: Option<String>,
    pub idea_cost: f64,
    pub prompts_cost: f64,
    pub videos_cost: f64,
    pub compose_cost: f64,
    pub post_cost: f64,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub error_message: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    pub fn total_cost(&self) -> f64 {
        self.idea_cost + self.prompts_cost + self.videos_cost + self.compose_cost + self.post_cost
    }
}

/// A human decision arriving on the decision channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    /// Operator asked for edits; the item stays pending.
    Edit,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "approve" => Self::Approve,
            "reject" => Self::Reject,
            "edit" => Self::Edit,
            other => return Err(format!("unknown review action '{other}'")),
        })
    }
}

/// Dedupe record: one row per decision-channel event id. Its existence
/// means the event was already processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewInteraction {
    /// Unique event id from the channel (callback id).
    pub event_id: String,
    pub content_id: String,
    pub action: ReviewAction,
    pub actor_id: String,
    pub created_at: DateTime<Utc>,
}

impl ReviewInteraction {
    pub fn new(event_id: &str, content_id: &str, action: ReviewAction, actor_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            content_id: content_id.to_string(),
            action,
            actor_id: actor_id.to_string(),
            created_at: Utc::now(),
        }
    }
}
