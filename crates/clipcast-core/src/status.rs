//! Content status state machine — a closed enum plus an explicit
//! adjacency table. The store's `transition` rejects any pair that
//! is not an edge here, so no stage can skip ahead or walk backwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of one content item. Persisted as the string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Generating,
    IdeaGenerated,
    PromptsGenerated,
    VideosGenerated,
    Composed,
    PendingReview,
    Approved,
    Rejected,
    Posting,
    Posted,
    Failed,
}

impl ContentStatus {
    /// Stored string form (stable — lives in the database).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::IdeaGenerated => "idea_generated",
            Self::PromptsGenerated => "prompts_generated",
            Self::VideosGenerated => "videos_generated",
            Self::Composed => "composed",
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Posting => "posting",
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Posted | Self::Rejected | Self::Failed)
    }

    /// Valid successor check. `Failed` is reachable from every
    /// non-terminal state; everything else follows the pipeline order.
    pub fn can_transition(&self, to: ContentStatus) -> bool {
        if to == Self::Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, to),
            (Self::Generating, Self::IdeaGenerated)
                | (Self::IdeaGenerated, Self::PromptsGenerated)
                | (Self::PromptsGenerated, Self::VideosGenerated)
                | (Self::VideosGenerated, Self::Composed)
                | (Self::Composed, Self::PendingReview)
                | (Self::PendingReview, Self::Approved)
                | (Self::PendingReview, Self::Rejected)
                | (Self::Approved, Self::Posting)
                | (Self::Posting, Self::Posted)
        )
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "generating" => Self::Generating,
            "idea_generated" => Self::IdeaGenerated,
            "prompts_generated" => Self::PromptsGenerated,
            "videos_generated" => Self::VideosGenerated,
            "composed" => Self::Composed,
            "pending_review" => Self::PendingReview,
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            "posting" => Self::Posting,
            "posted" => Self::Posted,
            "failed" => Self::Failed,
            other => return Err(format!("unknown content status '{other}'")),
        })
    }
}
