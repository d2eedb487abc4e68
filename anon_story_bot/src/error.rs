use std::time::Duration;

use crate::types::{ItemKind, StoryId};

/// Something went wrong talking to Telegram.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),
    #[error("Telegram did not respond within {0:?}")]
    TimedOut(Duration),
}

/// Reasons a moderation operation didn't go through.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    /// Nothing left of the submission after trimming whitespace.
    #[error("submission text is empty")]
    EmptyText,
    /// Advice was requested for a story that isn't published.
    #[error("story #{0} is not a published story")]
    StoryNotPublished(StoryId),
    /// Nothing pending under this ID. Either already decided or never existed.
    #[error("{kind} #{id} is not pending")]
    NotFound { kind: ItemKind, id: i64 },
    /// Posting to the channel failed. The item is still pending.
    #[error("failed to post to the channel: {0}")]
    PublishFailure(#[source] GatewayError),
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

impl ModerationError {
    /// True if trying the same thing again later may well succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModerationError::PublishFailure(_) | ModerationError::Store(_)
        )
    }

    /// True if this is the submitter's or reviewer's fault rather than ours.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ModerationError::EmptyText | ModerationError::StoryNotPublished(_)
        )
    }
}

/// What's wrong with the arguments of an `/advice` command.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdviceArgError {
    #[error("no story ID given")]
    Missing,
    #[error("{0:?} is not a story ID")]
    NotANumber(String),
}
