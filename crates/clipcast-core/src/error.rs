//! Error taxonomy for Clipcast.
//!
//! Precondition failures (`InvalidTransition`, `LockHeld`, `ChannelConflict`)
//! are fatal to the operation that hit them and are never retried. Transient
//! channel/store errors carry a message and are handled by the caller's own
//! backoff. A rejected review is not an error at all — it never appears here.

use crate::status::ContentStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClipcastError>;

#[derive(Error, Debug)]
pub enum ClipcastError {
    /// The stored status no longer matches the caller's expectation.
    /// Signals a concurrent writer; the row is left unchanged.
    #[error("invalid transition for content {content_id}: expected '{expected}', stored '{actual}'")]
    InvalidTransition {
        content_id: String,
        expected: ContentStatus,
        actual: ContentStatus,
    },

    /// The requested status pair is not an edge of the transition graph.
    #[error("no transition from '{from}' to '{to}'")]
    IllegalEdge { from: ContentStatus, to: ContentStatus },

    /// A pipeline stage collaborator failed.
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// No review decision arrived within the configured wait.
    #[error("review not decided within {0}s")]
    ReviewTimeout(u64),

    /// A decision event payload that is not `action:content_id`.
    #[error("invalid decision payload: {0}")]
    InvalidPayload(String),

    /// Another approval gateway instance owns the decision channel.
    #[error("process lock held by pid {pid} since {started_at} — remove the lock file if that process is dead")]
    LockHeld { pid: u32, started_at: String },

    /// The channel reported a second consumer attached. Fatal by design.
    #[error("decision channel conflict: another consumer is attached")]
    ChannelConflict,

    #[error("channel error: {0}")]
    Channel(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("content not found: {0}")]
    NotFound(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
