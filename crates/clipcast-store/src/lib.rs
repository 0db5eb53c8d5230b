//! # Clipcast Store
//!
//! SQLite-backed persistence shared by the scheduler process and the
//! approval gateway process. The two processes coordinate only through
//! this store; the single write that matters for cross-process safety
//! is the conditional status update in [`Store::transition`].

mod accounts;
mod content;
mod reviews;
mod store;

pub use content::TransitionFields;
pub use store::Store;
