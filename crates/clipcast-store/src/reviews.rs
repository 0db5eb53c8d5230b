//! Review interaction dedupe records.

use clipcast_core::error::{ClipcastError, Result};
use clipcast_core::types::{ReviewAction, ReviewInteraction};
use rusqlite::OptionalExtension;

use crate::store::{parse_ts_required, Store};

impl Store {
    /// Insert the dedupe record for a decision event. Returns `false`
    /// when a record for this event id already exists — the caller must
    /// treat the event as a duplicate delivery and apply no effects.
    pub fn insert_interaction(&self, interaction: &ReviewInteraction) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO review_interactions
                     (event_id, content_id, action, actor_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    interaction.event_id,
                    interaction.content_id,
                    interaction.action.as_str(),
                    interaction.actor_id,
                    interaction.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(changed == 1)
    }

    pub fn get_interaction(&self, event_id: &str) -> Result<Option<ReviewInteraction>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT event_id, content_id, action, actor_id, created_at
             FROM review_interactions WHERE event_id = ?1",
            rusqlite::params![event_id],
            |row| {
                Ok(ReviewInteraction {
                    event_id: row.get(0)?,
                    content_id: row.get(1)?,
                    action: row
                        .get::<_, String>(2)?
                        .parse()
                        .unwrap_or(ReviewAction::Edit),
                    actor_id: row.get(3)?,
                    created_at: parse_ts_required(row.get(4)?),
                })
            },
        )
        .optional()
        .map_err(|e| ClipcastError::Store(e.to_string()))
    }

    /// Test support for the crates downstream; not part of the
    /// operational surface.
    #[doc(hidden)]
    pub fn interaction_count(&self) -> Result<u32> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM review_interactions", [], |r| r.get(0))
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_insert_wins_duplicates_ignored() {
        let store = Store::open_in_memory().unwrap();
        let record = ReviewInteraction::new("cb-42", "content-1", ReviewAction::Reject, "actor-9");

        assert!(store.insert_interaction(&record).unwrap());
        // Same event id delivered again (network retry).
        assert!(!store.insert_interaction(&record).unwrap());
        assert_eq!(store.interaction_count().unwrap(), 1);

        let loaded = store.get_interaction("cb-42").unwrap().unwrap();
        assert_eq!(loaded.content_id, "content-1");
        assert_eq!(loaded.action, ReviewAction::Reject);
        assert_eq!(loaded.actor_id, "actor-9");
    }

    #[test]
    fn test_missing_interaction_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_interaction("cb-unknown").unwrap().is_none());
    }
}
