//! The pipeline orchestrator: one account, one content item, the full
//! stage sequence with a transition between every stage call.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use clipcast_core::error::{ClipcastError, Result};
use clipcast_core::status::ContentStatus;
use clipcast_core::types::{Account, Content};
use clipcast_store::{Store, TransitionFields};
use tokio::time::{sleep, Duration, Instant};

use crate::stages::Stage;

/// The five stage collaborators, in pipeline order.
pub struct StageSet {
    pub idea: Arc<dyn Stage>,
    pub prompts: Arc<dyn Stage>,
    pub videos: Arc<dyn Stage>,
    pub compose: Arc<dyn Stage>,
    pub publish: Arc<dyn Stage>,
}

/// What happens after the item reaches `pending_review`.
#[derive(Debug, Clone, Copy)]
pub enum ReviewMode {
    /// Return control; the approval gateway moves the item later.
    Detached,
    /// Poll the store until a decision arrives or the timeout elapses.
    Poll { interval: Duration, timeout: Duration },
}

/// Sends the approval request (message + decision buttons) when an
/// item reaches `pending_review`. Implemented by the gateway's channel
/// client; stubbed in tests.
#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    async fn review_requested(&self, account: &Account, content: &Content) -> Result<()>;
}

pub struct Pipeline {
    store: Arc<Store>,
    stages: StageSet,
    notifier: Option<Arc<dyn ReviewNotifier>>,
    review: ReviewMode,
}

impl Pipeline {
    pub fn new(store: Arc<Store>, stages: StageSet) -> Self {
        Self {
            store,
            stages,
            notifier: None,
            review: ReviewMode::Detached,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReviewNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_review(mut self, review: ReviewMode) -> Self {
        self.review = review;
        self
    }

    /// Run one new content item for the account. Returns the item in
    /// whatever state the configured review mode leaves it: pending
    /// review (detached), rejected, or posted. A rejected item is a
    /// first-class outcome, not an error.
    pub async fn run(&self, account: &Account) -> Result<Content> {
        let mut content = self.store.create_content(&account.id)?;
        tracing::info!("Pipeline started for '{}' (content {})", account.slug, content.id);

        let generation: [(&Arc<dyn Stage>, ContentStatus); 4] = [
            (&self.stages.idea, ContentStatus::IdeaGenerated),
            (&self.stages.prompts, ContentStatus::PromptsGenerated),
            (&self.stages.videos, ContentStatus::VideosGenerated),
            (&self.stages.compose, ContentStatus::Composed),
        ];
        for (stage, target) in generation {
            content = self.run_stage(account, content, stage.as_ref(), target).await?;
        }

        content = self.store.transition(
            &content.id,
            ContentStatus::Composed,
            ContentStatus::PendingReview,
            TransitionFields::default(),
        )?;

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.review_requested(account, &content).await {
                tracing::warn!("Review notification failed for {}: {e}", content.id);
            }
        }

        match self.review {
            ReviewMode::Detached => Ok(content),
            ReviewMode::Poll { interval, timeout } => {
                self.wait_for_review(account, content, interval, timeout).await
            }
        }
    }

    /// Resume an approved item through posting. Public so detached
    /// deployments can sweep approved items.
    pub async fn publish(&self, account: &Account, content: Content) -> Result<Content> {
        let content = self.store.transition(
            &content.id,
            ContentStatus::Approved,
            ContentStatus::Posting,
            TransitionFields::default(),
        )?;
        match self.stages.publish.run(account, &content).await {
            Ok(out) => self.store.transition(
                &content.id,
                ContentStatus::Posting,
                ContentStatus::Posted,
                TransitionFields {
                    cost: Some(out.cost),
                    video_path: out.artifact_path,
                    posted_at: Some(Utc::now()),
                    ..TransitionFields::default()
                },
            ),
            Err(e) => {
                self.mark_failed(&content, &e);
                Err(e)
            }
        }
    }

    async fn run_stage(
        &self,
        account: &Account,
        content: Content,
        stage: &dyn Stage,
        target: ContentStatus,
    ) -> Result<Content> {
        tracing::debug!("Stage '{}' for content {}", stage.name(), content.id);
        match stage.run(account, &content).await {
            Ok(out) => self.store.transition(
                &content.id,
                content.status,
                target,
                TransitionFields {
                    cost: Some(out.cost),
                    idea: out.idea,
                    video_path: out.artifact_path,
                    ..TransitionFields::default()
                },
            ),
            Err(e) => {
                tracing::warn!("Stage '{}' failed for {}: {e}", stage.name(), content.id);
                self.mark_failed(&content, &e);
                Err(e)
            }
        }
    }

    /// Poll the store until the gateway records a decision, then either
    /// publish (approved) or stop (rejected). Past the deadline the item
    /// is marked failed so a late decision hits the expected-status
    /// check instead of resurrecting it.
    async fn wait_for_review(
        &self,
        account: &Account,
        pending: Content,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Content> {
        let deadline = Instant::now() + timeout;
        loop {
            sleep(interval).await;
            let content = self.store.get_content(&pending.id)?;
            match content.status {
                ContentStatus::PendingReview => {
                    if Instant::now() >= deadline {
                        let err = ClipcastError::ReviewTimeout(timeout.as_secs());
                        self.mark_failed(&content, &err);
                        return Err(err);
                    }
                }
                ContentStatus::Approved => return self.publish(account, content).await,
                ContentStatus::Rejected => {
                    tracing::info!("Content {} rejected by review", content.id);
                    return Ok(content);
                }
                ContentStatus::Failed => {
                    return Err(ClipcastError::Stage {
                        stage: "review".into(),
                        message: content
                            .error_message
                            .unwrap_or_else(|| "failed while pending review".into()),
                    });
                }
                // Another process already carried it past approval.
                other => {
                    tracing::info!("Content {} moved to '{other}' externally", content.id);
                    return Ok(content);
                }
            }
        }
    }

    fn mark_failed(&self, content: &Content, err: &ClipcastError) {
        let fields = TransitionFields::error(err.to_string());
        if let Err(te) =
            self.store
                .transition(&content.id, content.status, ContentStatus::Failed, fields)
        {
            tracing::error!("Could not mark content {} failed: {te}", content.id);
        }
    }
}
