//! A gateway that never talks to Telegram, for tests.

#![allow(clippy::unwrap_used)]

use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use teloxide::{
    types::{MessageId, UserId},
    ApiError, RequestError,
};

use super::{ChannelPost, Gateway, ModerationEngine, ReviewRequest};
use crate::{database::Database, error::GatewayError, Config};

pub(crate) const ADMIN_A: UserId = UserId(1);
pub(crate) const ADMIN_B: UserId = UserId(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PublishMode {
    Works,
    Fails,
    Hangs,
}

pub(crate) struct MockInner {
    review_requests: Mutex<Vec<(UserId, ReviewRequest)>>,
    posts: Mutex<Vec<ChannelPost>>,
    unreachable: Mutex<Vec<UserId>>,
    publish_mode: Mutex<PublishMode>,
    next_message_id: AtomicI32,
}

/// Remembers everything it was asked to send, and fails on command.
#[derive(Clone)]
pub(crate) struct MockGateway(Arc<MockInner>);

impl MockGateway {
    pub(crate) fn new() -> Self {
        MockGateway(Arc::new(MockInner {
            review_requests: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            unreachable: Mutex::new(Vec::new()),
            publish_mode: Mutex::new(PublishMode::Works),
            next_message_id: AtomicI32::new(500),
        }))
    }

    pub(crate) fn set_publish_mode(&self, mode: PublishMode) {
        *self.0.publish_mode.lock().unwrap() = mode;
    }

    pub(crate) fn make_unreachable(&self, reviewer: UserId) {
        self.0.unreachable.lock().unwrap().push(reviewer);
    }

    pub(crate) fn review_requests(&self) -> Vec<(UserId, ReviewRequest)> {
        self.0.review_requests.lock().unwrap().clone()
    }

    pub(crate) fn posts(&self) -> Vec<ChannelPost> {
        self.0.posts.lock().unwrap().clone()
    }
}

impl Gateway for MockGateway {
    async fn send_review_request(
        &self,
        reviewer: UserId,
        request: &ReviewRequest,
    ) -> Result<(), GatewayError> {
        if self.0.unreachable.lock().unwrap().contains(&reviewer) {
            return Err(RequestError::Api(ApiError::ChatNotFound).into());
        }
        self.0
            .review_requests
            .lock()
            .unwrap()
            .push((reviewer, request.clone()));
        Ok(())
    }

    async fn publish(&self, post: &ChannelPost) -> Result<MessageId, GatewayError> {
        // Give concurrent deciders a chance to interleave.
        tokio::task::yield_now().await;

        let mode = *self.0.publish_mode.lock().unwrap();
        match mode {
            PublishMode::Works => {
                self.0.posts.lock().unwrap().push(post.clone());
                Ok(MessageId(
                    self.0.next_message_id.fetch_add(1, Ordering::SeqCst),
                ))
            }
            PublishMode::Fails => Err(RequestError::Api(ApiError::ChatNotFound).into()),
            PublishMode::Hangs => std::future::pending().await,
        }
    }
}

pub(crate) async fn setup() -> (tempfile::TempDir, ModerationEngine<MockGateway>, MockGateway) {
    let (dir, db) = Database::temporary().await;
    let gateway = MockGateway::new();
    let engine = ModerationEngine::new(
        db,
        gateway.clone(),
        vec![ADMIN_A, ADMIN_B],
        Duration::from_millis(200),
    );
    (dir, engine, gateway)
}


/// Configuration matching the engine from [`setup`].
pub(crate) fn config() -> Config {
    Config {
        bot_token: "123:test".to_string(),
        admins: vec![ADMIN_A, ADMIN_B],
        channel_id: teloxide::types::ChatId(-100),
        database_path: ":memory:".to_string(),
        transport_timeout: Duration::from_millis(200),
    }
}
