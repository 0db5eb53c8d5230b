//! # Clipcast Gateway
//!
//! The approval gateway: a single-instance process that consumes the
//! Telegram decision channel, applies each human decision to the
//! content store exactly once, and reflects it back into the chat.
//!
//! Exclusivity is enforced twice: a filesystem [`lock::LockFile`]
//! checked at startup, and the channel's own concurrent-consumer
//! conflict, which is fatal when it fires anyway.

pub mod gateway;
pub mod handler;
pub mod lock;
pub mod telegram;

pub use gateway::ApprovalGateway;
pub use handler::{parse_decision, DecisionHandler, ReviewChannel};
pub use lock::{LockFile, ProcessLock};
pub use telegram::TelegramApi;
