//! Content rows and the atomic status transition.
//!
//! `transition` is the single point where the pipeline's monotonic
//! status invariant is enforced: one conditional row update whose
//! predicate carries the caller's expected prior status.

use chrono::{DateTime, Utc};
use clipcast_core::error::{ClipcastError, Result};
use clipcast_core::status::ContentStatus;
use clipcast_core::types::Content;
use rusqlite::Row;

use crate::store::{parse_ts, parse_ts_required, Store};

/// Optional fields written alongside a status change. `cost` is routed
/// to the per-stage cost column of the target status.
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    pub cost: Option<f64>,
    pub idea: Option<String>,
    pub video_path: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub error_message: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl TransitionFields {
    pub fn cost(cost: f64) -> Self {
        Self { cost: Some(cost), ..Self::default() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { error_message: Some(message.into()), ..Self::default() }
    }
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<Content> {
    let status: String = row.get("status")?;
    Ok(Content {
        id: row.get("id")?,
        account_id: row.get("account_id")?,
        status: status.parse().unwrap_or(ContentStatus::Failed),
        idea: row.get("idea")?,
        video_path: row.get("video_path")?,
        idea_cost: row.get("idea_cost")?,
        prompts_cost: row.get("prompts_cost")?,
        videos_cost: row.get("videos_cost")?,
        compose_cost: row.get("compose_cost")?,
        post_cost: row.get("post_cost")?,
        reviewed_by: row.get("reviewed_by")?,
        reviewed_at: parse_ts(row.get("reviewed_at")?),
        review_notes: row.get("review_notes")?,
        error_message: row.get("error_message")?,
        posted_at: parse_ts(row.get("posted_at")?),
        created_at: parse_ts_required(row.get("created_at")?),
        updated_at: parse_ts_required(row.get("updated_at")?),
    })
}

/// Which cost column a transition's cost lands in.
fn cost_deltas(to: ContentStatus, cost: f64) -> [f64; 5] {
    let mut deltas = [0.0; 5];
    let slot = match to {
        ContentStatus::IdeaGenerated => 0,
        ContentStatus::PromptsGenerated => 1,
        ContentStatus::VideosGenerated => 2,
        ContentStatus::Composed => 3,
        ContentStatus::Posted => 4,
        _ => return deltas,
    };
    deltas[slot] = cost;
    deltas
}

impl Store {
    /// Create a fresh content item in `generating`.
    pub fn create_content(&self, account_id: &str) -> Result<Content> {
        let now = Utc::now();
        let content = Content {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            status: ContentStatus::Generating,
            idea: None,
            video_path: None,
            idea_cost: 0.0,
            prompts_cost: 0.0,
            videos_cost: 0.0,
            compose_cost: 0.0,
            post_cost: 0.0,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            error_message: None,
            posted_at: None,
            created_at: now,
            updated_at: now,
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO content (id, account_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![
                content.id,
                content.account_id,
                content.status.as_str(),
                now.to_rfc3339()
            ],
        )
        .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(content)
    }

    pub fn get_content(&self, id: &str) -> Result<Content> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM content WHERE id = ?1",
            rusqlite::params![id],
            content_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ClipcastError::NotFound(id.into()),
            other => ClipcastError::Store(other.to_string()),
        })
    }

    /// Items currently in the given status, oldest first. Used by the
    /// detached-mode sweep over approved items.
    pub fn content_by_status(&self, status: ContentStatus) -> Result<Vec<Content>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM content WHERE status = ?1 ORDER BY created_at ASC")
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![status.as_str()], content_from_row)
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Id of the most recently created content row. Test support for
    /// the crates downstream; not part of the operational surface.
    #[doc(hidden)]
    pub fn latest_content_id(&self) -> Result<String> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id FROM content ORDER BY created_at DESC, rowid DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ClipcastError::NotFound("no content".into()),
            other => ClipcastError::Store(other.to_string()),
        })
    }

    /// Move a content item from `from_expected` to `to`, writing the
    /// given fields in the same row update.
    ///
    /// Fails with `IllegalEdge` when the pair is not in the transition
    /// graph, and with `InvalidTransition` when the stored status no
    /// longer equals `from_expected` (a concurrent writer got there
    /// first); in both cases the row is untouched.
    pub fn transition(
        &self,
        content_id: &str,
        from_expected: ContentStatus,
        to: ContentStatus,
        fields: TransitionFields,
    ) -> Result<Content> {
        if !from_expected.can_transition(to) {
            return Err(ClipcastError::IllegalEdge { from: from_expected, to });
        }

        let deltas = cost_deltas(to, fields.cost.unwrap_or(0.0));
        let changed = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE content SET
                     status = ?3,
                     updated_at = ?4,
                     idea = COALESCE(?5, idea),
                     video_path = COALESCE(?6, video_path),
                     reviewed_by = COALESCE(?7, reviewed_by),
                     reviewed_at = COALESCE(?8, reviewed_at),
                     review_notes = COALESCE(?9, review_notes),
                     error_message = COALESCE(?10, error_message),
                     posted_at = COALESCE(?11, posted_at),
                     idea_cost = idea_cost + ?12,
                     prompts_cost = prompts_cost + ?13,
                     videos_cost = videos_cost + ?14,
                     compose_cost = compose_cost + ?15,
                     post_cost = post_cost + ?16
                 WHERE id = ?1 AND status = ?2",
                rusqlite::params![
                    content_id,
                    from_expected.as_str(),
                    to.as_str(),
                    Utc::now().to_rfc3339(),
                    fields.idea,
                    fields.video_path,
                    fields.reviewed_by,
                    fields.reviewed_at.map(|t| t.to_rfc3339()),
                    fields.review_notes,
                    fields.error_message,
                    fields.posted_at.map(|t| t.to_rfc3339()),
                    deltas[0],
                    deltas[1],
                    deltas[2],
                    deltas[3],
                    deltas[4],
                ],
            )
            .map_err(|e| ClipcastError::Store(e.to_string()))?
        };

        if changed == 1 {
            return self.get_content(content_id);
        }
        // Zero rows: either the item is gone or somebody moved it first.
        let current = self.get_content(content_id)?;
        Err(ClipcastError::InvalidTransition {
            content_id: content_id.to_string(),
            expected: from_expected,
            actual: current.status,
        })
    }
}
