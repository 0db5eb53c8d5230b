//! Idempotent decision handling.
//!
//! Each callback event is applied at most once: the dedupe row keyed
//! by the event id is written before any effect, so a redelivery of
//! the same id is a silent no-op even when an earlier attempt died
//! partway through the acknowledgement or message edit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use clipcast_core::error::{ClipcastError, Result};
use clipcast_core::status::ContentStatus;
use clipcast_core::types::{ReviewAction, ReviewInteraction};
use clipcast_store::{Store, TransitionFields};

use crate::telegram::{CallbackQuery, TelegramApi};

/// The channel operations the handler needs: acknowledgement and the
/// display-only message edit. Both best-effort.
#[async_trait]
pub trait ReviewChannel: Send + Sync {
    async fn acknowledge(&self, callback_id: &str, text: &str) -> Result<()>;
    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;
}

#[async_trait]
impl ReviewChannel for TelegramApi {
    async fn acknowledge(&self, callback_id: &str, text: &str) -> Result<()> {
        self.answer_callback_query(callback_id, text).await
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.edit_message_text(chat_id, message_id, text).await
    }
}

/// Parse a decision payload of the form `action:content_id`.
pub fn parse_decision(data: &str) -> Result<(ReviewAction, String)> {
    let (action, content_id) = data
        .split_once(':')
        .ok_or_else(|| ClipcastError::InvalidPayload(data.to_string()))?;
    if content_id.is_empty() {
        return Err(ClipcastError::InvalidPayload(data.to_string()));
    }
    let action: ReviewAction = action
        .parse()
        .map_err(|_| ClipcastError::InvalidPayload(data.to_string()))?;
    Ok((action, content_id.to_string()))
}

pub struct DecisionHandler {
    store: Arc<Store>,
    channel: Arc<dyn ReviewChannel>,
}

impl DecisionHandler {
    pub fn new(store: Arc<Store>, channel: Arc<dyn ReviewChannel>) -> Self {
        Self { store, channel }
    }

    /// Handle one callback event.
    ///
    /// Errors are returned only for problems before the dedupe record
    /// is written (unparseable payload, store failure). Once the record
    /// exists, later failures are logged and swallowed — the event must
    /// never be re-applied on redelivery.
    pub async fn handle(&self, event: &CallbackQuery) -> Result<()> {
        let data = event.data.as_deref().unwrap_or_default();
        let (action, content_id) = parse_decision(data)?;
        let actor = event.from.display_name().to_string();

        let interaction = ReviewInteraction::new(&event.id, &content_id, action, &actor);
        if !self.store.insert_interaction(&interaction)? {
            tracing::debug!("Duplicate delivery of event {}, ignoring", event.id);
            return Ok(());
        }

        tracing::info!("Decision '{action}' for content {content_id} by {actor}");

        let applied = self.apply_transition(action, &content_id, &actor);
        let (ack_text, edit_text) = decision_texts(action, &actor, applied.is_ok());
        if let Err(e) = applied {
            tracing::warn!("Decision on {content_id} not applied: {e}");
        }

        if let Err(e) = self.channel.acknowledge(&event.id, &ack_text).await {
            tracing::warn!("Acknowledge failed for event {}: {e}", event.id);
        }

        if let Some(message) = &event.message {
            if let Err(e) = self
                .channel
                .edit_message(message.chat.id, message.message_id, &edit_text)
                .await
            {
                tracing::warn!("Message edit failed for event {}: {e}", event.id);
            }
        }

        Ok(())
    }

    fn apply_transition(&self, action: ReviewAction, content_id: &str, actor: &str) -> Result<()> {
        let target = match action {
            ReviewAction::Approve => ContentStatus::Approved,
            ReviewAction::Reject => ContentStatus::Rejected,
            // Edit requests keep the item pending; only the record and
            // the chat reflect them.
            ReviewAction::Edit => return Ok(()),
        };
        let fields = TransitionFields {
            reviewed_by: Some(actor.to_string()),
            reviewed_at: Some(Utc::now()),
            ..TransitionFields::default()
        };
        self.store
            .transition(content_id, ContentStatus::PendingReview, target, fields)
            .map(|_| ())
    }
}

fn decision_texts(action: ReviewAction, actor: &str, applied: bool) -> (String, String) {
    if !applied {
        return (
            "Decision recorded, but the item was no longer pending".into(),
            format!("⚠️ Decision by {actor} arrived after the item left review"),
        );
    }
    match action {
        ReviewAction::Approve => ("Approved".into(), format!("✅ APPROVED by {actor}")),
        ReviewAction::Reject => ("Rejected".into(), format!("❌ REJECTED by {actor}")),
        ReviewAction::Edit => (
            "Edit requested".into(),
            format!("✏️ EDIT REQUESTED by {actor} — item stays pending"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{TelegramChat, TelegramMessage, TelegramUser};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        acks: Mutex<Vec<(String, String)>>,
        edits: Mutex<Vec<(i64, i64, String)>>,
    }

    #[async_trait]
    impl ReviewChannel for RecordingChannel {
        async fn acknowledge(&self, callback_id: &str, text: &str) -> Result<()> {
            self.acks
                .lock()
                .unwrap()
                .push((callback_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
            self.edits
                .lock()
                .unwrap()
                .push((chat_id, message_id, text.to_string()));
            Ok(())
        }
    }

    fn pending_content(store: &Store) -> String {
        let account = clipcast_core::types::Account {
            id: "acct-1".into(),
            slug: "demo".into(),
            display_name: "Demo".into(),
            access_token: None,
            token_expires_at: None,
            posting_schedule: Default::default(),
            is_active: true,
            consecutive_failures: 0,
            last_post_at: None,
            last_error: None,
            created_at: Utc::now(),
        };
        store.insert_account(&account).unwrap();
        let content = store.create_content("acct-1").unwrap();
        use ContentStatus::*;
        for (from, to) in [
            (Generating, IdeaGenerated),
            (IdeaGenerated, PromptsGenerated),
            (PromptsGenerated, VideosGenerated),
            (VideosGenerated, Composed),
            (Composed, PendingReview),
        ] {
            store
                .transition(&content.id, from, to, TransitionFields::default())
                .unwrap();
        }
        content.id
    }

    fn callback(event_id: &str, data: &str) -> CallbackQuery {
        CallbackQuery {
            id: event_id.to_string(),
            from: TelegramUser {
                id: 777,
                first_name: "Ana".into(),
                username: Some("ana_r".into()),
            },
            message: Some(TelegramMessage {
                message_id: 55,
                chat: TelegramChat { id: -100123 },
            }),
            data: Some(data.to_string()),
        }
    }

    fn handler(store: &Arc<Store>) -> (DecisionHandler, Arc<RecordingChannel>) {
        let channel = Arc::new(RecordingChannel::default());
        (DecisionHandler::new(store.clone(), channel.clone()), channel)
    }

    #[test]
    fn test_parse_decision() {
        assert_eq!(
            parse_decision("approve:ab12-cd34").unwrap(),
            (ReviewAction::Approve, "ab12-cd34".to_string())
        );
        assert_eq!(
            parse_decision("reject:x").unwrap(),
            (ReviewAction::Reject, "x".to_string())
        );
        assert!(matches!(
            parse_decision("publish:x"),
            Err(ClipcastError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_decision("approve:"),
            Err(ClipcastError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_decision("garbage"),
            Err(ClipcastError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_transitions_records_and_reflects() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let content_id = pending_content(&store);
        let (handler, channel) = handler(&store);

        handler
            .handle(&callback("cb-1", &format!("approve:{content_id}")))
            .await
            .unwrap();

        let content = store.get_content(&content_id).unwrap();
        assert_eq!(content.status, ContentStatus::Approved);
        assert_eq!(content.reviewed_by.as_deref(), Some("ana_r"));
        assert!(content.reviewed_at.is_some());
        assert!(store.get_interaction("cb-1").unwrap().is_some());

        assert_eq!(channel.acks.lock().unwrap().len(), 1);
        let edits = channel.edits.lock().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, -100123);
        assert!(edits[0].2.contains("APPROVED"));
        assert!(edits[0].2.contains("ana_r"));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_silent_noop() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let content_id = pending_content(&store);
        let (handler, channel) = handler(&store);
        let event = callback("cb-dup", &format!("reject:{content_id}"));

        handler.handle(&event).await.unwrap();
        handler.handle(&event).await.unwrap(); // network retry

        assert_eq!(store.interaction_count().unwrap(), 1);
        assert_eq!(
            store.get_content(&content_id).unwrap().status,
            ContentStatus::Rejected
        );
        // Second delivery produced no further channel traffic.
        assert_eq!(channel.acks.lock().unwrap().len(), 1);
        assert_eq!(channel.edits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_leaves_no_trace() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let content_id = pending_content(&store);
        let (handler, channel) = handler(&store);

        let err = handler
            .handle(&callback("cb-bad", "ship-it!"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipcastError::InvalidPayload(_)));

        assert_eq!(store.interaction_count().unwrap(), 0);
        assert_eq!(
            store.get_content(&content_id).unwrap().status,
            ContentStatus::PendingReview
        );
        assert!(channel.acks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_request_keeps_item_pending() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let content_id = pending_content(&store);
        let (handler, channel) = handler(&store);

        handler
            .handle(&callback("cb-edit", &format!("edit:{content_id}")))
            .await
            .unwrap();

        assert_eq!(
            store.get_content(&content_id).unwrap().status,
            ContentStatus::PendingReview
        );
        let interaction = store.get_interaction("cb-edit").unwrap().unwrap();
        assert_eq!(interaction.action, ReviewAction::Edit);
        assert!(channel.edits.lock().unwrap()[0].2.contains("EDIT REQUESTED"));
    }

    #[tokio::test]
    async fn test_late_decision_on_settled_item_keeps_record() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let content_id = pending_content(&store);
        let (handler, channel) = handler(&store);

        // Review already timed out: the item left pending_review.
        store
            .transition(
                &content_id,
                ContentStatus::PendingReview,
                ContentStatus::Failed,
                TransitionFields::error("review not decided within 3600s"),
            )
            .unwrap();

        handler
            .handle(&callback("cb-late", &format!("approve:{content_id}")))
            .await
            .unwrap();

        // The interaction stands, the status does not change.
        assert!(store.get_interaction("cb-late").unwrap().is_some());
        assert_eq!(
            store.get_content(&content_id).unwrap().status,
            ContentStatus::Failed
        );
        assert!(channel.edits.lock().unwrap()[0].2.contains("after the item left review"));
    }
}
