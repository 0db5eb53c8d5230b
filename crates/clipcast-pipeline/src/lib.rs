//! # Clipcast Pipeline
//!
//! Runs one content item through its generation stages, the approval
//! gate, and publishing. Stage bodies are external collaborators behind
//! the [`Stage`] trait; this crate owns the status transitions only.

pub mod orchestrator;
pub mod stages;

pub use orchestrator::{Pipeline, ReviewMode, ReviewNotifier, StageSet};
pub use stages::{HttpStage, Stage, StageOutput};
