//! The approval gateway: single-instance long-polling consumer.
//!
//! Exactly one gateway may poll the channel at a time. The file lock
//! catches a second instance on the same host early; a 409 from the
//! channel catches one anywhere, and is fatal — we step aside instead
//! of fighting over updates.

use std::sync::Arc;

use clipcast_core::config::TelegramConfig;
use clipcast_core::error::{ClipcastError, Result};
use clipcast_store::Store;

use crate::handler::DecisionHandler;
use crate::lock::LockFile;
use crate::telegram::TelegramApi;

pub struct ApprovalGateway {
    api: Arc<TelegramApi>,
    handler: DecisionHandler,
    lock: LockFile,
    offset: i64,
    wait_secs: u64,
    backoff_secs: u64,
}

impl std::fmt::Debug for ApprovalGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGateway")
            .field("lock", &self.lock)
            .field("offset", &self.offset)
            .field("wait_secs", &self.wait_secs)
            .field("backoff_secs", &self.backoff_secs)
            .finish_non_exhaustive()
    }
}

impl ApprovalGateway {
    /// Acquire the instance lock and wire up the consumer. Fails with
    /// `LockHeld` when another gateway already runs on this host.
    pub fn start(config: &TelegramConfig, store: Arc<Store>) -> Result<Self> {
        let lock_path = shellexpand::tilde(&config.lock_path).into_owned();
        let lock = LockFile::acquire(std::path::Path::new(&lock_path))?;
        // One client, shared between the poller and the handler.
        let api = Arc::new(TelegramApi::new(&config.bot_token));
        let handler = DecisionHandler::new(store, api.clone());
        Ok(Self {
            api,
            handler,
            lock,
            offset: 0,
            wait_secs: config.poll_wait_secs,
            backoff_secs: config.poll_backoff_secs,
        })
    }

    /// Poll until Ctrl-C or a channel conflict. The lock is released on
    /// both exits; a conflict still returns the error so the binary can
    /// exit non-zero.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!("🛂 Approval gateway polling (wait {}s)", self.wait_secs);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down approval gateway");
                    self.lock.release()?;
                    return Ok(());
                }
                updates = self.api.get_updates(self.offset + 1, self.wait_secs) => {
                    match updates {
                        Ok(updates) => self.drain(updates).await,
                        Err(ClipcastError::ChannelConflict) => {
                            tracing::error!("Another consumer took over the channel, stopping");
                            self.lock.release()?;
                            return Err(ClipcastError::ChannelConflict);
                        }
                        Err(e) => {
                            tracing::warn!("Poll failed, retrying in {}s: {e}", self.backoff_secs);
                            tokio::time::sleep(std::time::Duration::from_secs(self.backoff_secs)).await;
                        }
                    }
                }
            }
        }
    }

    /// Apply a batch in arrival order. The offset advances past every
    /// update, decided or not, so a poison event cannot wedge the feed.
    async fn drain(&mut self, updates: Vec<crate::telegram::TelegramUpdate>) {
        for update in updates {
            self.offset = self.offset.max(update.update_id);
            let Some(event) = update.callback_query else {
                continue;
            };
            if let Err(e) = self.handler.handle(&event).await {
                tracing::warn!("Skipping event {}: {e}", event.id);
            }
        }
    }
}
