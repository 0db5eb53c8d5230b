//! Scheduler engine — refresh cycle, fire handler, ad-hoc due runs.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use clipcast_core::error::Result;
use clipcast_core::types::{Account, Content};
use clipcast_pipeline::Pipeline;
use clipcast_store::Store;
use tokio::time::{sleep, Duration};

use crate::compile::{compile_schedule, local_day_start, FireSpec};
use crate::registry::{TimerHandle, TimerRegistry};

/// What a fire actually runs. The pipeline orchestrator in production;
/// a stub in tests.
#[async_trait]
pub trait ContentRunner: Send + Sync {
    async fn run_for(&self, account: &Account) -> Result<Content>;
}

#[async_trait]
impl ContentRunner for Pipeline {
    async fn run_for(&self, account: &Account) -> Result<Content> {
        self.run(account).await
    }
}

/// The scheduler engine. One per scheduler process; owns the timer
/// registry exclusively.
pub struct SchedulerEngine {
    store: Arc<Store>,
    runner: Arc<dyn ContentRunner>,
    registry: Mutex<TimerRegistry>,
    max_failures: u32,
}

impl SchedulerEngine {
    pub fn new(store: Arc<Store>, runner: Arc<dyn ContentRunner>, max_failures: u32) -> Self {
        Self {
            store,
            runner,
            registry: Mutex::new(TimerRegistry::new()),
            max_failures,
        }
    }

    /// Refresh cycle: cancel every live timer, reload active accounts,
    /// recompile and register. Returns the number of fire specs
    /// registered. Store errors are logged — the previous registration
    /// is kept rather than leaving the scheduler with no timers at all.
    pub fn refresh(&self) -> usize {
        let accounts = match self.store.active_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!("Refresh aborted, could not load accounts: {e}");
                return self.registry.lock().map(|r| r.timer_count()).unwrap_or(0);
            }
        };

        let mut registry = match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.cancel_all();

        let mut count = 0;
        for account in accounts {
            let specs = compile_schedule(&account);
            if specs.is_empty() {
                tracing::warn!("Account '{}' has no usable posting times", account.slug);
                continue;
            }
            count += specs.len();
            let timers: Vec<TimerHandle> =
                specs.into_iter().map(|spec| self.spawn_timer(spec)).collect();
            registry.register(&account.id, timers);
        }
        tracing::info!("⏰ Scheduler refreshed: {count} fire timers registered");
        count
    }

    /// Run the scheduler: refresh immediately, then on the fixed cadence.
    pub async fn run(&self, refresh_interval: Duration) {
        let mut interval = tokio::time::interval(refresh_interval);
        loop {
            interval.tick().await;
            self.refresh();
        }
    }

    /// Ad-hoc pass: fire every due account once, in fairness order.
    /// Returns how many accounts were attempted.
    pub async fn run_due(&self) -> usize {
        let accounts = match self.store.due_accounts(self.max_failures) {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!("Due-account query failed: {e}");
                return 0;
            }
        };
        let count = accounts.len();
        for account in accounts {
            fire_account(&self.store, &self.runner, self.max_failures, &account.id).await;
        }
        count
    }

    /// Fire one account now (manual trigger).
    pub async fn fire(&self, account_id: &str) {
        fire_account(&self.store, &self.runner, self.max_failures, account_id).await;
    }

    /// Snapshot of registered timers for operator listing.
    pub fn registered(&self) -> Vec<(String, Vec<String>)> {
        self.registry.lock().map(|r| r.list()).unwrap_or_default()
    }

    fn spawn_timer(&self, spec: FireSpec) -> TimerHandle {
        let describe = spec.describe();
        let store = self.store.clone();
        let runner = self.runner.clone();
        let max_failures = self.max_failures;

        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = spec.next_fire(now) else {
                    tracing::warn!(
                        "No next fire for account {} ({}), timer exiting",
                        spec.account_id,
                        spec.describe()
                    );
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tracing::debug!(
                    "Account {} next fire {next} ({})",
                    spec.account_id,
                    spec.describe()
                );
                sleep(wait).await;
                fire_account(&store, &runner, max_failures, &spec.account_id).await;
            }
        });
        TimerHandle::new(describe, handle)
    }
}

/// The fire handler. All failures end up in the log and the account's
/// failure counter — never propagated, so one misbehaving account
/// cannot stop the refresh loop or other accounts' timers.
pub(crate) async fn fire_account(
    store: &Arc<Store>,
    runner: &Arc<dyn ContentRunner>,
    max_failures: u32,
    account_id: &str,
) {
    if let Err(e) = try_fire(store, runner, max_failures, account_id).await {
        tracing::warn!("Fire handler failed for account {account_id}: {e}");
    }
}

async fn try_fire(
    store: &Arc<Store>,
    runner: &Arc<dyn ContentRunner>,
    max_failures: u32,
    account_id: &str,
) -> Result<()> {
    // Re-read: the account may have been edited or tripped since the
    // timer was registered.
    let account = store.get_account(account_id)?;
    if !account.is_active {
        tracing::debug!("Account '{}' inactive, skipping fire", account.slug);
        return Ok(());
    }
    if account.is_tripped(max_failures) {
        tracing::warn!(
            "Account '{}' tripped ({} consecutive failures), skipping fire",
            account.slug,
            account.consecutive_failures
        );
        return Ok(());
    }

    let tz: chrono_tz::Tz = account
        .posting_schedule
        .timezone
        .parse()
        .unwrap_or(chrono_tz::UTC);
    let day_start = local_day_start(tz, Utc::now());
    let posted_today = store.posted_count_since(&account.id, day_start)?;
    if posted_today >= account.posting_schedule.posts_per_day {
        tracing::info!(
            "Account '{}' already posted {posted_today}/{} today, skipping",
            account.slug,
            account.posting_schedule.posts_per_day
        );
        return Ok(());
    }

    match runner.run_for(&account).await {
        Ok(content) => {
            tracing::info!(
                "✅ Pipeline finished for '{}' (content {}, status {})",
                account.slug,
                content.id,
                content.status
            );
            store.record_success(&account.id, content.posted_at)?;
        }
        Err(e) => {
            tracing::warn!("⚠️ Pipeline failed for '{}': {e}", account.slug);
            store.record_failure(&account.id, &e.to_string())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipcast_core::error::ClipcastError;
    use clipcast_core::status::ContentStatus;
    use clipcast_core::types::PostingSchedule;
    use clipcast_store::TransitionFields;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub runner: counts invocations; optionally drives a content item
    /// all the way to posted so quota counting sees it.
    struct StubRunner {
        store: Arc<Store>,
        calls: AtomicUsize,
        outcome: Outcome,
    }

    enum Outcome {
        Posted,
        Pending,
        Fail,
    }

    #[async_trait]
    impl ContentRunner for StubRunner {
        async fn run_for(&self, account: &Account) -> Result<Content> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Fail => Err(ClipcastError::Stage {
                    stage: "videos".into(),
                    message: "render crashed".into(),
                }),
                Outcome::Pending => {
                    let content = self.store.create_content(&account.id)?;
                    walk(&self.store, &content.id, ContentStatus::PendingReview)?;
                    self.store.get_content(&content.id)
                }
                Outcome::Posted => {
                    let content = self.store.create_content(&account.id)?;
                    walk(&self.store, &content.id, ContentStatus::Posted)?;
                    self.store.get_content(&content.id)
                }
            }
        }
    }

    fn walk(store: &Store, id: &str, until: ContentStatus) -> Result<()> {
        use ContentStatus::*;
        let chain = [
            (Generating, IdeaGenerated),
            (IdeaGenerated, PromptsGenerated),
            (PromptsGenerated, VideosGenerated),
            (VideosGenerated, Composed),
            (Composed, PendingReview),
            (PendingReview, Approved),
            (Approved, Posting),
            (Posting, Posted),
        ];
        for (from, to) in chain {
            let fields = if to == Posted {
                TransitionFields { posted_at: Some(Utc::now()), ..Default::default() }
            } else {
                TransitionFields::default()
            };
            store.transition(id, from, to, fields)?;
            if to == until {
                break;
            }
        }
        Ok(())
    }

    fn seed_account(store: &Store, posts_per_day: u32, failures: u32) -> Account {
        let account = Account {
            id: "acct-1".into(),
            slug: "demo".into(),
            display_name: "Demo".into(),
            access_token: None,
            token_expires_at: None,
            posting_schedule: PostingSchedule {
                posting_times: vec!["09:00".into(), "18:00".into()],
                active_days: None,
                timezone: "UTC".into(),
                posts_per_day,
            },
            is_active: true,
            consecutive_failures: failures,
            last_post_at: None,
            last_error: None,
            created_at: Utc::now(),
        };
        store.insert_account(&account).unwrap();
        account
    }

    fn engine(store: &Arc<Store>, outcome: Outcome) -> (SchedulerEngine, Arc<StubRunner>) {
        let runner = Arc::new(StubRunner {
            store: store.clone(),
            calls: AtomicUsize::new(0),
            outcome,
        });
        (SchedulerEngine::new(store.clone(), runner.clone(), 5), runner)
    }

    #[tokio::test]
    async fn test_quota_bounds_fires_per_day() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_account(&store, 1, 0);
        let (engine, runner) = engine(&store, Outcome::Posted);

        // Two fire specs exist for the account; fire both plus a manual
        // trigger. Only the first run may reach the pipeline.
        engine.fire("acct-1").await;
        engine.fire("acct-1").await;
        engine.fire("acct-1").await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tripped_account_never_fires() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_account(&store, 3, 5);
        let (engine, runner) = engine(&store, Outcome::Posted);

        engine.fire("acct-1").await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.run_due().await, 0); // excluded from the due query too
    }

    #[tokio::test]
    async fn test_failure_increments_counter_and_records_error() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_account(&store, 3, 0);
        let (engine, runner) = engine(&store, Outcome::Fail);

        engine.fire("acct-1").await;
        let account = store.get_account("acct-1").unwrap();
        assert_eq!(account.consecutive_failures, 1);
        assert!(account.last_error.as_deref().unwrap().contains("render crashed"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_clears_counter() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_account(&store, 3, 3);
        // Below the ceiling, so it still fires; success resets to zero.
        let (engine, _) = engine(&store, Outcome::Posted);

        engine.fire("acct-1").await;
        let account = store.get_account("acct-1").unwrap();
        assert_eq!(account.consecutive_failures, 0);
        assert!(account.last_post_at.is_some());
    }

    #[tokio::test]
    async fn test_pending_run_clears_counter_without_post_stamp() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_account(&store, 3, 2);
        let (engine, _) = engine(&store, Outcome::Pending);

        engine.fire("acct-1").await;
        let account = store.get_account("acct-1").unwrap();
        assert_eq!(account.consecutive_failures, 0);
        assert!(account.last_post_at.is_none());
    }

    #[tokio::test]
    async fn test_refresh_registers_one_timer_per_posting_time() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_account(&store, 2, 0); // two posting times
        let (engine, _) = engine(&store, Outcome::Posted);

        assert_eq!(engine.refresh(), 2);
        let listing = engine.registered();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].0, "acct-1");
        assert_eq!(listing[0].1.len(), 2);

        // A second refresh replaces rather than accumulates.
        assert_eq!(engine.refresh(), 2);
        assert_eq!(engine.registered()[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_run_due_fires_in_fairness_order() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_account(&store, 3, 0);
        let mut second = seed_dummy("acct-2", "other");
        second.last_post_at = Some(Utc::now());
        store.insert_account(&second).unwrap();

        let (engine, runner) = engine(&store, Outcome::Pending);
        assert_eq!(engine.run_due().await, 2);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    }

    fn seed_dummy(id: &str, slug: &str) -> Account {
        Account {
            id: id.into(),
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
}
