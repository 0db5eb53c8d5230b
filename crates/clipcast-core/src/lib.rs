//! # Clipcast Core
//!
//! Shared foundation for every Clipcast crate: the content status
//! state machine, account and content records, the error taxonomy,
//! and the TOML configuration system.

pub mod config;
pub mod error;
pub mod status;
pub mod types;

pub use config::ClipcastConfig;
pub use error::{ClipcastError, Result};
pub use status::ContentStatus;
pub use types::{Account, Content, PostingSchedule, ReviewAction, ReviewInteraction};
