use std::{fmt::Display, num::ParseIntError, str::FromStr};

use chrono::{DateTime, Utc};
use teloxide::types::{MessageId, UserId};

/// ID of a story. The same ID is kept when a pending story gets published.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoryId(pub i64);

/// ID of a piece of advice awaiting review.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct AdviceId(pub i64);

impl Display for StoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Display for AdviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for StoryId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(StoryId)
    }
}

/// What kind of submission something is.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemKind {
    Story,
    Advice,
}

impl ItemKind {
    fn as_callback_str(self) -> &'static str {
        match self {
            ItemKind::Story => "STORY",
            ItemKind::Advice => "ADVICE",
        }
    }

    /// For the start of a sentence.
    pub fn capitalized(self) -> &'static str {
        match self {
            ItemKind::Story => "Story",
            ItemKind::Advice => "Advice",
        }
    }
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ItemKind::Story => "story",
            ItemKind::Advice => "advice",
        })
    }
}

/// What a reviewer decided to do with a pending item.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn as_callback_str(self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Reject => "REJECT",
        }
    }
}

/// A story nobody has decided on yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingStory {
    pub id: StoryId,
    pub text: String,
    /// Who sent it. Never shown to reviewers or posted anywhere.
    pub author: UserId,
    pub submitted_at: DateTime<Utc>,
}

/// A story that was approved and posted to the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedStory {
    pub id: StoryId,
    pub text: String,
    /// The post in the channel.
    pub channel_message_id: MessageId,
}

/// Advice for a published story that nobody has decided on yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAdvice {
    pub id: AdviceId,
    pub story_id: StoryId,
    pub text: String,
    /// Who sent it. Never shown to reviewers or posted anywhere.
    pub author: UserId,
    pub submitted_at: DateTime<Utc>,
}

/// Data carried by a review keyboard button.
///
/// Telegram only allows up to 64 bytes of callback data, so this is
/// a compact `"<DECISION> <KIND> <ID>"` string, like `"APPROVE STORY 12"`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ReviewCallbackData {
    pub decision: Decision,
    pub kind: ItemKind,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackDataError {
    #[error("empty callback data")]
    Empty,
    #[error("unknown decision {0:?}")]
    UnknownDecision(String),
    #[error("unknown item kind {0:?}")]
    UnknownKind(String),
    #[error("missing item kind")]
    MissingKind,
    #[error("missing item ID")]
    MissingId,
    #[error("bad item ID: {0}")]
    BadId(#[from] ParseIntError),
    #[error("extraneous data in callback")]
    Extraneous,
}

impl Display for ReviewCallbackData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.decision.as_callback_str(),
            self.kind.as_callback_str(),
            self.id
        )
    }
}

impl FromStr for ReviewCallbackData {
    type Err = CallbackDataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut iter = value.split_ascii_whitespace();

        let decision = match iter.next().ok_or(CallbackDataError::Empty)? {
            "APPROVE" => Decision::Approve,
            "REJECT" => Decision::Reject,
            other => return Err(CallbackDataError::UnknownDecision(other.to_string())),
        };

        let kind = match iter.next().ok_or(CallbackDataError::MissingKind)? {
            "STORY" => ItemKind::Story,
            "ADVICE" => ItemKind::Advice,
            other => return Err(CallbackDataError::UnknownKind(other.to_string())),
        };

        let id = iter.next().ok_or(CallbackDataError::MissingId)?.parse()?;

        if iter.next().is_some() {
            return Err(CallbackDataError::Extraneous);
        }

        Ok(ReviewCallbackData { decision, kind, id })
    }
}
