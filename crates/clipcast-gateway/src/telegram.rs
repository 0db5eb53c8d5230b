//! Telegram Bot decision channel — long polling + callback handling
//! via the Bot API.

use clipcast_core::error::{ClipcastError, Result};
use clipcast_core::types::{Account, Content};
use serde::Deserialize;
use std::time::Duration;

/// Thin Bot API client. Holds no offset or lock state — that belongs
/// to the polling loop.
pub struct TelegramApi {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, "https://api.telegram.org")
    }

    /// Point at a self-hosted Bot API server (or a test double).
    pub fn with_base_url(token: &str, base_url: &str) -> Self {
        Self {
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Long-poll for callback events past `offset`. A 409 from the API
    /// means another consumer attached — surfaced as `ChannelConflict`,
    /// which the polling loop treats as fatal.
    pub async fn get_updates(&self, offset: i64, wait_secs: u64) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", wait_secs.to_string()),
                ("allowed_updates", "[\"callback_query\"]".into()),
            ])
            // Server-side wait plus slack for the round trip.
            .timeout(Duration::from_secs(wait_secs + 15))
            .send()
            .await
            .map_err(|e| ClipcastError::Channel(format!("getUpdates failed: {e}")))?;

        if response.status().as_u16() == 409 {
            return Err(ClipcastError::ChannelConflict);
        }

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| ClipcastError::Channel(format!("invalid getUpdates response: {e}")))?;
        body.into_result()
    }

    /// Acknowledge a callback so the sender's UI stops spinning.
    /// Best-effort at the call site; failures are logged, not retried.
    pub async fn answer_callback_query(&self, callback_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "callback_query_id": callback_id,
            "text": text,
        });
        let response = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClipcastError::Channel(format!("answerCallbackQuery failed: {e}")))?;
        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ClipcastError::Channel(format!("invalid answer response: {e}")))?;
        result.into_result().map(|_| ())
    }

    /// Rewrite the original review message to show the recorded
    /// decision. Display only — never drives logic.
    pub async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        let response = self
            .client
            .post(self.api_url("editMessageText"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClipcastError::Channel(format!("editMessageText failed: {e}")))?;
        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ClipcastError::Channel(format!("invalid edit response: {e}")))?;
        result.into_result().map(|_| ())
    }

    /// Send the review request: rendered summary plus the decision
    /// buttons whose callback data the handler parses back.
    pub async fn send_review_request(&self, chat_id: i64, account: &Account, content: &Content) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": render_review_message(account, content),
            "reply_markup": {
                "inline_keyboard": [[
                    { "text": "✅ Approve", "callback_data": format!("approve:{}", content.id) },
                    { "text": "❌ Reject", "callback_data": format!("reject:{}", content.id) },
                    { "text": "✏️ Edit", "callback_data": format!("edit:{}", content.id) },
                ]]
            }
        });
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ClipcastError::Channel(format!("sendMessage failed: {e}")))?;
        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ClipcastError::Channel(format!("invalid send response: {e}")))?;
        result.into_result().map(|_| ())
    }
}

/// The approval message body.
pub fn render_review_message(account: &Account, content: &Content) -> String {
    let idea = content.idea.as_deref().unwrap_or("(no idea text)");
    let artifact = content.video_path.as_deref().unwrap_or("(not composed)");
    format!(
        "🎬 Review requested — {}\n\nIdea: {}\nArtifact: {}\nCost so far: ${:.2}\nContent: {}",
        account.display_name,
        idea,
        artifact,
        content.total_cost(),
        content.id,
    )
}

// --- Telegram API types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

impl<T> TelegramApiResponse<T> {
    /// Fold the `ok`/`error_code` envelope into our error taxonomy,
    /// keeping the 409 conflict distinguishable from transport noise.
    pub fn into_result(self) -> Result<T>
    where
        T: Default,
    {
        if !self.ok {
            if self.error_code == Some(409) {
                return Err(ClipcastError::ChannelConflict);
            }
            return Err(ClipcastError::Channel(format!(
                "Telegram API error: {}",
                self.description.unwrap_or_default()
            )));
        }
        Ok(self.result.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Globally unique event id — the dedupe key.
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<TelegramMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

impl TelegramUser {
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}
