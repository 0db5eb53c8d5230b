//! # Clipcast Scheduler
//!
//! Translates each active account's posting schedule into concrete
//! recurring fire times and runs the pipeline when due.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (hourly refresh)
//!   ├── cancel every registered timer
//!   ├── reload active accounts
//!   └── per account: compile "HH:MM" × weekdays × timezone → FireSpec
//!         └── one tokio task per FireSpec
//!               └── sleep until next fire → fire handler
//!                     ├── quota met today?  → no-op
//!                     ├── pipeline ok       → clear failure counter
//!                     └── pipeline failed   → count failure, record error
//! ```
//! Lightweight cron — fire times are computed directly in the account's
//! timezone with chrono, no cron crate dependency.

pub mod compile;
pub mod engine;
pub mod registry;

pub use compile::{compile_schedule, FireSpec};
pub use engine::{ContentRunner, SchedulerEngine};
pub use registry::{TimerHandle, TimerRegistry};
