//! The moderation engine: takes submissions in, sends them to reviewers,
//! and applies whatever the first reviewer decides.
//!
//! Everything that moves a story or advice between "pending", "published"
//! and "gone" goes through [`ModerationEngine`].

mod locks;

#[cfg(test)]
pub(crate) mod mock;

use std::{future::Future, time::Duration};

use futures::future::join_all;
use teloxide::types::{MessageId, UserId};

use locks::DecisionLocks;

use crate::{
    conversation::ConversationRouter,
    database::Database,
    error::{GatewayError, ModerationError},
    types::{
        AdviceId, Decision, ItemKind, PendingAdvice, PendingStory, PublishedStory, StoryId,
    },
};

/// What reviewers get to see about a pending item. Deliberately has no
/// author in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewRequest {
    Story {
        id: StoryId,
        text: String,
    },
    Advice {
        id: AdviceId,
        story_id: StoryId,
        text: String,
    },
}

impl ReviewRequest {
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        match self {
            ReviewRequest::Story { .. } => ItemKind::Story,
            ReviewRequest::Advice { .. } => ItemKind::Advice,
        }
    }

    /// ID of the item, without the type telling which kind it is.
    #[must_use]
    pub fn raw_id(&self) -> i64 {
        match self {
            ReviewRequest::Story { id, .. } => id.0,
            ReviewRequest::Advice { id, .. } => id.0,
        }
    }
}

impl From<&PendingStory> for ReviewRequest {
    fn from(story: &PendingStory) -> Self {
        ReviewRequest::Story {
            id: story.id,
            text: story.text.clone(),
        }
    }
}

impl From<&PendingAdvice> for ReviewRequest {
    fn from(advice: &PendingAdvice) -> Self {
        ReviewRequest::Advice {
            id: advice.id,
            story_id: advice.story_id,
            text: advice.text.clone(),
        }
    }
}

/// Something to be posted to the public channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelPost {
    Story { id: StoryId, text: String },
    Advice { story_id: StoryId, text: String },
}

/// Whatever delivers messages for the engine. In production that's Telegram,
/// see [`crate::TelegramGateway`].
pub trait Gateway: Send + Sync {
    /// Show this pending item to a reviewer, with buttons to approve or reject it.
    fn send_review_request(
        &self,
        reviewer: UserId,
        request: &ReviewRequest,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Post to the public channel. Returns the ID of the resulting post.
    fn publish(
        &self,
        post: &ChannelPost,
    ) -> impl Future<Output = Result<MessageId, GatewayError>> + Send;
}

/// How sending a review request to one reviewer went.
#[derive(Debug)]
pub struct Delivery {
    pub reviewer: UserId,
    pub result: Result<(), GatewayError>,
}

/// A freshly queued item, along with how notifying reviewers about it went.
#[derive(Debug)]
pub struct Submission<Id> {
    pub id: Id,
    pub deliveries: Vec<Delivery>,
}

impl<Id> Submission<Id> {
    /// Returns `true` if at least one reviewer got the review request.
    #[must_use]
    pub fn reached_anyone(&self) -> bool {
        self.deliveries.iter().any(|x| x.result.is_ok())
    }
}

/// Result of deciding on a pending story.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoryOutcome {
    Published(PublishedStory),
    Discarded(StoryId),
}

/// Result of deciding on pending advice. Either way, the advice is gone from
/// the database afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdviceOutcome {
    Published {
        advice: PendingAdvice,
        channel_message_id: MessageId,
    },
    Discarded(PendingAdvice),
}

pub struct ModerationEngine<G> {
    db: Database,
    gateway: G,
    reviewers: Vec<UserId>,
    transport_timeout: Duration,
    locks: DecisionLocks,
}

impl<G: Gateway> ModerationEngine<G> {
    /// `transport_timeout` bounds every single call to the gateway.
    pub fn new(
        db: Database,
        gateway: G,
        reviewers: Vec<UserId>,
        transport_timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            reviewers,
            transport_timeout,
            locks: DecisionLocks::default(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run a gateway call, giving up after the transport timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.transport_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::TimedOut(self.transport_timeout)),
        }
    }

    /// Send a review request to one reviewer.
    pub async fn send_review_request(
        &self,
        reviewer: UserId,
        request: &ReviewRequest,
    ) -> Result<(), GatewayError> {
        self.bounded(self.gateway.send_review_request(reviewer, request))
            .await
    }

    /// Send a review request to every reviewer at once. One reviewer failing
    /// doesn't stop the others from getting it.
    async fn notify_reviewers(&self, request: &ReviewRequest) -> Vec<Delivery> {
        let deliveries: Vec<Delivery> =
            join_all(self.reviewers.iter().map(|&reviewer| async move {
                Delivery {
                    reviewer,
                    result: self.send_review_request(reviewer, request).await,
                }
            }))
            .await;

        for delivery in &deliveries {
            if let Err(e) = &delivery.result {
                log::warn!(
                    "Failed to send {} #{} to reviewer {}: {e}",
                    request.kind(),
                    request.raw_id(),
                    delivery.reviewer
                );
            }
        }

        if !deliveries.iter().any(|x| x.result.is_ok()) {
            log::error!(
                "No reviewer got {} #{}! It stays pending until someone sends /pending.",
                request.kind(),
                request.raw_id()
            );
        }

        deliveries
    }

    /// Queue a new story and send it to reviewers.
    pub async fn submit_story(
        &self,
        text: &str,
        author: UserId,
    ) -> Result<Submission<StoryId>, ModerationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ModerationError::EmptyText);
        }

        let id = self.db.insert_pending_story(text, author).await?;
        log::debug!("New story #{id} submitted.");

        let request = ReviewRequest::Story {
            id,
            text: text.to_string(),
        };
        let deliveries = self.notify_reviewers(&request).await;

        Ok(Submission { id, deliveries })
    }

    /// Let this user send advice for a story. Only works for published stories.
    ///
    /// On success, the next text message from the user is taken as the advice.
    pub async fn request_advice(
        &self,
        router: &ConversationRouter,
        author: UserId,
        story_id: StoryId,
    ) -> Result<(), ModerationError> {
        if !self.db.is_story_published(story_id).await? {
            return Err(ModerationError::StoryNotPublished(story_id));
        }

        router.arm_advice(author, story_id);
        Ok(())
    }

    /// Queue advice for a story and send it to reviewers.
    ///
    /// Expects `story_id` to have gone through [`Self::request_advice`] already.
    /// Published stories are never removed, so it can't have gone stale since.
    pub async fn submit_advice(
        &self,
        story_id: StoryId,
        text: &str,
        author: UserId,
    ) -> Result<Submission<AdviceId>, ModerationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ModerationError::EmptyText);
        }

        let id = self.db.insert_pending_advice(story_id, text, author).await?;
        log::debug!("New advice #{id} submitted for story #{story_id}.");

        let request = ReviewRequest::Advice {
            id,
            story_id,
            text: text.to_string(),
        };
        let deliveries = self.notify_reviewers(&request).await;

        Ok(Submission { id, deliveries })
    }

    /// Approve or reject a pending story.
    ///
    /// Only the first decision on a story does anything; later ones get
    /// [`ModerationError::NotFound`]. If posting to the channel fails, the
    /// story stays pending so the decision can be retried.
    pub async fn decide_story(
        &self,
        id: StoryId,
        decision: Decision,
    ) -> Result<StoryOutcome, ModerationError> {
        let not_found = || ModerationError::NotFound {
            kind: ItemKind::Story,
            id: id.0,
        };

        let _guard = self.locks.lock(ItemKind::Story, id.0).await;

        match decision {
            Decision::Reject => {
                if !self.db.delete_pending_story(id).await? {
                    return Err(not_found());
                }
                log::debug!("Story #{id} rejected.");
                Ok(StoryOutcome::Discarded(id))
            }
            Decision::Approve => {
                let Some(story) = self.db.get_pending_story(id).await? else {
                    return Err(not_found());
                };

                let post = ChannelPost::Story {
                    id,
                    text: story.text,
                };
                let channel_message_id = self
                    .bounded(self.gateway.publish(&post))
                    .await
                    .map_err(|e| {
                        log::error!("Failed to post story #{id} to the channel: {e}");
                        ModerationError::PublishFailure(e)
                    })?;

                match self.db.publish_pending_story(id, channel_message_id).await {
                    Ok(Some(published)) => {
                        log::debug!("Story #{id} approved and posted.");
                        Ok(StoryOutcome::Published(published))
                    }
                    Ok(None) => {
                        // Can't happen while we hold the lock, unless someone edits the database by hand.
                        log::error!("Story #{id} disappeared while being posted!");
                        Err(not_found())
                    }
                    Err(e) => {
                        log::error!(
                            "Story #{id} was posted as message {} but couldn't be marked as published: {e}",
                            channel_message_id.0
                        );
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// Approve or reject pending advice.
    ///
    /// Same rules as [`Self::decide_story`], except that advice doesn't stick
    /// around in the database once it's decided on.
    pub async fn decide_advice(
        &self,
        id: AdviceId,
        decision: Decision,
    ) -> Result<AdviceOutcome, ModerationError> {
        let not_found = || ModerationError::NotFound {
            kind: ItemKind::Advice,
            id: id.0,
        };

        let _guard = self.locks.lock(ItemKind::Advice, id.0).await;

        match decision {
            Decision::Reject => {
                let Some(advice) = self.db.take_pending_advice(id).await? else {
                    return Err(not_found());
                };
                log::debug!("Advice #{id} rejected.");
                Ok(AdviceOutcome::Discarded(advice))
            }
            Decision::Approve => {
                let Some(advice) = self.db.get_pending_advice(id).await? else {
                    return Err(not_found());
                };

                let post = ChannelPost::Advice {
                    story_id: advice.story_id,
                    text: advice.text.clone(),
                };
                let channel_message_id = self
                    .bounded(self.gateway.publish(&post))
                    .await
                    .map_err(|e| {
                        log::error!("Failed to post advice #{id} to the channel: {e}");
                        ModerationError::PublishFailure(e)
                    })?;

                if self.db.take_pending_advice(id).await?.is_none() {
                    log::error!("Advice #{id} disappeared while being posted!");
                    return Err(not_found());
                }

                log::debug!("Advice #{id} approved and posted.");
                Ok(AdviceOutcome::Published {
                    advice,
                    channel_message_id,
                })
            }
        }
    }

    /// Everything that still waits for a decision, stories first.
    pub async fn pending_items(&self) -> Result<Vec<ReviewRequest>, ModerationError> {
        let stories = self.db.list_pending_stories().await?;
        let advice = self.db.list_pending_advice().await?;

        Ok(stories
            .iter()
            .map(ReviewRequest::from)
            .chain(advice.iter().map(ReviewRequest::from))
            .collect())
    }
}
