//! Timer registry — the scheduler's explicit ownership of every live
//! fire timer, keyed by account id. Never exposed as global state.

use std::collections::HashMap;
use tokio::task::JoinHandle;

/// A spawned fire timer. Aborted on drop, so a cancelled timer can
/// never fire after cancellation.
pub struct TimerHandle {
    pub spec: String,
    handle: JoinHandle<()>,
}

impl TimerHandle {
    pub fn new(spec: String, handle: JoinHandle<()>) -> Self {
        Self { spec, handle }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// All live timers, keyed by account id. Re-registering an account
/// replaces (and cancels) its previous timers, so a refresh never
/// leaves two overlapping registrations for one account.
#[derive(Default)]
pub struct TimerRegistry {
    timers: HashMap<String, Vec<TimerHandle>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, account_id: &str, timers: Vec<TimerHandle>) {
        if self.timers.insert(account_id.to_string(), timers).is_some() {
            tracing::debug!("Replaced existing timers for account {account_id}");
        }
    }

    /// Cancel and drop every registered timer.
    pub fn cancel_all(&mut self) {
        let count: usize = self.timers.values().map(Vec::len).sum();
        if count > 0 {
            tracing::info!("Cancelling {count} timers");
        }
        self.timers.clear();
    }

    pub fn cancel(&mut self, account_id: &str) -> bool {
        self.timers.remove(account_id).is_some()
    }

    /// (account id, fire spec descriptions) pairs, for operator listing.
    pub fn list(&self) -> Vec<(String, Vec<String>)> {
        let mut out: Vec<_> = self
            .timers
            .iter()
            .map(|(id, timers)| (id.clone(), timers.iter().map(|t| t.spec.clone()).collect()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn timer_count(&self) -> usize {
        self.timers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn sleeper(spec: &str, fired: Arc<AtomicBool>) -> TimerHandle {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fired.store(true, Ordering::SeqCst);
        });
        TimerHandle::new(spec.into(), handle)
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let mut registry = TimerRegistry::new();
        registry.register("acct-1", vec![sleeper("09:00 UTC", fired.clone())]);

        registry.cancel_all();
        assert!(registry.is_empty());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_reregister_replaces_old_timers() {
        let old_fired = Arc::new(AtomicBool::new(false));
        let mut registry = TimerRegistry::new();
        registry.register("acct-1", vec![sleeper("09:00 UTC", old_fired.clone())]);
        registry.register("acct-1", vec![sleeper("10:00 UTC", Arc::new(AtomicBool::new(false)))]);

        assert_eq!(registry.timer_count(), 1);
        let listing = registry.list();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].1, vec!["10:00 UTC".to_string()]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!old_fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_list_and_cancel_single() {
        let mut registry = TimerRegistry::new();
        let flag = Arc::new(AtomicBool::new(false));
        registry.register("b", vec![sleeper("18:00 UTC", flag.clone())]);
        registry.register(
            "a",
            vec![sleeper("08:00 UTC", flag.clone()), sleeper("12:00 UTC", flag.clone())],
        );

        assert_eq!(registry.timer_count(), 3);
        let listing = registry.list();
        assert_eq!(listing[0].0, "a");
        assert_eq!(listing[0].1.len(), 2);

        assert!(registry.cancel("b"));
        assert!(!registry.cancel("b"));
        assert_eq!(registry.timer_count(), 2);
    }
}
