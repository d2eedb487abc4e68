use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use teloxide::types::UserId;

use crate::types::StoryId;

/// What the bot expects from a user next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Next text message is a new story.
    #[default]
    Idle,
    /// Next text message is advice for this published story.
    AwaitingAdvice(StoryId),
}

/// How an incoming text message should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    NewStory,
    Advice(StoryId),
}

/// Keeps track of what each user is in the middle of.
///
/// Lives only as long as the process does. Losing it just means someone
/// has to send `/advice` again.
#[derive(Debug, Default)]
pub struct ConversationRouter {
    modes: Mutex<HashMap<UserId, Mode>>,
}

impl ConversationRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn modes(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, Mode>> {
        // Nothing in here can be left half-updated, so poisoning is harmless.
        self.modes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current mode of this user.
    #[must_use]
    pub fn mode(&self, user: UserId) -> Mode {
        self.modes().get(&user).copied().unwrap_or_default()
    }

    /// Treat the next text message from this user as advice for this story.
    ///
    /// Only call this for stories known to be published.
    pub fn arm_advice(&self, user: UserId, story_id: StoryId) {
        self.modes().insert(user, Mode::AwaitingAdvice(story_id));
    }

    /// Forget whatever this user was in the middle of.
    pub fn clear(&self, user: UserId) {
        self.modes().remove(&user);
    }

    /// Decide what a text message from this user is, and go back to
    /// [`Mode::Idle`] if it's advice.
    ///
    /// The advice mode is consumed right here, so that it's reset whether the
    /// advice then gets submitted fine or not, and so that two messages in a
    /// row can't both end up as advice.
    pub fn route(&self, user: UserId) -> Route {
        match self.modes().remove(&user) {
            Some(Mode::AwaitingAdvice(story_id)) => Route::Advice(story_id),
            Some(Mode::Idle) | None => Route::NewStory,
        }
    }
}
