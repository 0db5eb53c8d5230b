//! Account query surface: scheduling reads, success/failure counters,
//! and the token fields owned by the external refresh collaborator.

use chrono::{DateTime, Utc};
use clipcast_core::error::{ClipcastError, Result};
use clipcast_core::types::{Account, PostingSchedule};
use rusqlite::Row;

use crate::store::{parse_ts, parse_ts_required, Store};

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let schedule_json: String = row.get("posting_schedule")?;
    let posting_schedule: PostingSchedule =
        serde_json::from_str(&schedule_json).unwrap_or_else(|e| {
            tracing::warn!("Malformed posting_schedule, using defaults: {e}");
            PostingSchedule::default()
        });
    Ok(Account {
        id: row.get("id")?,
        slug: row.get("slug")?,
        display_name: row.get("display_name")?,
        access_token: row.get("access_token")?,
        token_expires_at: parse_ts(row.get("token_expires_at")?),
        posting_schedule,
        is_active: row.get::<_, i64>("is_active")? != 0,
        consecutive_failures: row.get::<_, i64>("consecutive_failures")? as u32,
        last_post_at: parse_ts(row.get("last_post_at")?),
        last_error: row.get("last_error")?,
        created_at: parse_ts_required(row.get("created_at")?),
    })
}

const ACCOUNT_COLS: &str = "id, slug, display_name, access_token, token_expires_at, \
     posting_schedule, is_active, consecutive_failures, last_post_at, last_error, created_at";

impl Store {
    /// Insert a new account (operator/CLI surface).
    pub fn insert_account(&self, account: &Account) -> Result<()> {
        let conn = self.lock()?;
        let schedule = serde_json::to_string(&account.posting_schedule)
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        conn.execute(
            "INSERT INTO accounts (id, slug, display_name, access_token, token_expires_at,
                 posting_schedule, is_active, consecutive_failures, last_post_at, last_error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                account.id,
                account.slug,
                account.display_name,
                account.access_token,
                account.token_expires_at.map(|t| t.to_rfc3339()),
                schedule,
                account.is_active as i64,
                account.consecutive_failures as i64,
                account.last_post_at.map(|t| t.to_rfc3339()),
                account.last_error,
                account.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(())
    }

    pub fn get_account(&self, id: &str) -> Result<Account> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLS} FROM accounts WHERE id = ?1"),
            rusqlite::params![id],
            account_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ClipcastError::AccountNotFound(id.into()),
            other => ClipcastError::Store(other.to_string()),
        })
    }

    pub fn get_account_by_slug(&self, slug: &str) -> Result<Account> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLS} FROM accounts WHERE slug = ?1"),
            rusqlite::params![slug],
            account_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => ClipcastError::AccountNotFound(slug.into()),
            other => ClipcastError::Store(other.to_string()),
        })
    }

    /// Every account, for operator listing.
    pub fn all_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {ACCOUNT_COLS} FROM accounts ORDER BY slug"))
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], account_from_row)
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Every active account, schedule edits included — the refresh cycle
    /// recompiles timers from this set.
    pub fn active_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLS} FROM accounts WHERE is_active = 1 ORDER BY slug"
            ))
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], account_from_row)
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Active accounts below the failure ceiling, never-posted first,
    /// then oldest post first. The ordering is the fairness guarantee
    /// for the ad-hoc "run all due now" pass.
    pub fn due_accounts(&self, max_failures: u32) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLS} FROM accounts
                 WHERE is_active = 1 AND consecutive_failures < ?1
                 ORDER BY last_post_at IS NOT NULL, last_post_at ASC"
            ))
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![max_failures as i64], account_from_row)
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Record a successful pipeline run: clears the failure counter and
    /// last error; bumps `last_post_at` only when the run actually posted.
    pub fn record_success(&self, account_id: &str, posted_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE accounts SET consecutive_failures = 0, last_error = NULL,
                 last_post_at = COALESCE(?2, last_post_at)
             WHERE id = ?1",
            rusqlite::params![account_id, posted_at.map(|t| t.to_rfc3339())],
        )
        .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(())
    }

    /// Record a failed pipeline run for the circuit breaker.
    pub fn record_failure(&self, account_id: &str, error: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE accounts SET consecutive_failures = consecutive_failures + 1,
                 last_error = ?2
             WHERE id = ?1",
            rusqlite::params![account_id, error],
        )
        .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(())
    }

    /// Token refresh surface — the only account fields the external
    /// refresh collaborator may write.
    pub fn update_token(
        &self,
        account_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE accounts SET access_token = ?2, token_expires_at = ?3 WHERE id = ?1",
            rusqlite::params![account_id, token, expires_at.to_rfc3339()],
        )
        .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(())
    }

    /// Count posts since the given UTC instant (the account's local
    /// midnight, computed by the scheduler). Quota reads go through here.
    pub fn posted_count_since(&self, account_id: &str, since: DateTime<Utc>) -> Result<u32> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM content
                 WHERE account_id = ?1 AND status = 'posted' AND posted_at >= ?2",
                rusqlite::params![account_id, since.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(|e| ClipcastError::Store(e.to_string()))?;
        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(slug: &str) -> Account {
        Account {
            id: format!("acct-{slug}"),
            slug: slug.into(),
            display_name: slug.to_uppercase(),
            access_token: None,
            token_expires_at: None,
            posting_schedule: PostingSchedule::default(),
            is_active: true,
            consecutive_failures: 0,
            last_post_at: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = Store::open_in_memory().unwrap();
        store.insert_account(&account("alpha")).unwrap();
        let loaded = store.get_account("acct-alpha").unwrap();
        assert_eq!(loaded.slug, "alpha");
        assert!(loaded.is_active);
        let by_slug = store.get_account_by_slug("alpha").unwrap();
        assert_eq!(by_slug.id, "acct-alpha");
        assert!(matches!(
            store.get_account("nope"),
            Err(ClipcastError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_due_ordering_never_posted_first_then_oldest() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();

        let mut old = account("old");
        old.last_post_at = Some(now - Duration::days(3));
        let mut recent = account("recent");
        recent.last_post_at = Some(now - Duration::hours(1));
        let fresh = account("fresh"); // never posted

        store.insert_account(&recent).unwrap();
        store.insert_account(&old).unwrap();
        store.insert_account(&fresh).unwrap();

        let due = store.due_accounts(5).unwrap();
        let slugs: Vec<_> = due.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["fresh", "old", "recent"]);
    }

    #[test]
    fn test_tripped_accounts_excluded_from_due() {
        let store = Store::open_in_memory().unwrap();
        let mut bad = account("bad");
        bad.consecutive_failures = 5;
        store.insert_account(&bad).unwrap();
        store.insert_account(&account("good")).unwrap();

        let due = store.due_accounts(5).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].slug, "good");
    }

    #[test]
    fn test_inactive_excluded_everywhere() {
        let store = Store::open_in_memory().unwrap();
        let mut off = account("off");
        off.is_active = false;
        store.insert_account(&off).unwrap();
        assert!(store.active_accounts().unwrap().is_empty());
        assert!(store.due_accounts(5).unwrap().is_empty());
        // Still visible to the operator listing.
        assert_eq!(store.all_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_failure_then_success_resets_counter() {
        let store = Store::open_in_memory().unwrap();
        store.insert_account(&account("a")).unwrap();

        store.record_failure("acct-a", "render exploded").unwrap();
        store.record_failure("acct-a", "render exploded again").unwrap();
        let acct = store.get_account("acct-a").unwrap();
        assert_eq!(acct.consecutive_failures, 2);
        assert_eq!(acct.last_error.as_deref(), Some("render exploded again"));

        let posted = Utc::now();
        store.record_success("acct-a", Some(posted)).unwrap();
        let acct = store.get_account("acct-a").unwrap();
        assert_eq!(acct.consecutive_failures, 0);
        assert!(acct.last_error.is_none());
        assert!(acct.last_post_at.is_some());
    }

    #[test]
    fn test_success_without_post_keeps_last_post_at() {
        let store = Store::open_in_memory().unwrap();
        let when = Utc::now() - Duration::days(1);
        let mut acct = account("a");
        acct.last_post_at = Some(when);
        store.insert_account(&acct).unwrap();

        store.record_success("acct-a", None).unwrap();
        let acct = store.get_account("acct-a").unwrap();
        assert_eq!(
            acct.last_post_at.map(|t| t.timestamp()),
            Some(when.timestamp())
        );
    }

    #[test]
    fn test_update_token_touches_only_token_fields() {
        let store = Store::open_in_memory().unwrap();
        store.insert_account(&account("a")).unwrap();
        let expiry = Utc::now() + Duration::days(30);
        store.update_token("acct-a", "tok-123", expiry).unwrap();
        let acct = store.get_account("acct-a").unwrap();
        assert_eq!(acct.access_token.as_deref(), Some("tok-123"));
        assert_eq!(acct.consecutive_failures, 0);
    }
}
