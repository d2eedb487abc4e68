use std::future::Future;

use arch_bot_commons::{split_for_telegram, TELEGRAM_MESSAGE_LIMIT};
use html_escape::encode_text;
use teloxide::{
    payloads::SendMessageSetters,
    requests::Requester,
    sugar::request::RequestLinkPreviewExt,
    types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, UserId},
    Bot, RequestError,
};

use crate::{
    error::GatewayError,
    moderation::{ChannelPost, Gateway, ReviewRequest},
    types::{Decision, ItemKind, ReviewCallbackData},
};

/// How much of the submitted text goes into one message. Leaves room for
/// headers and footers within Telegram's limit.
const BODY_LIMIT: usize = TELEGRAM_MESSAGE_LIMIT - 256;

/// How many times to try sending one message when Telegram says to slow down.
const SEND_ATTEMPTS: u8 = 3;

/// Rendered message text, split to fit into Telegram messages. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parts {
    first: String,
    rest: Vec<String>,
}

impl Parts {
    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.first.as_str()).chain(self.rest.iter().map(String::as_str))
    }
}

/// Delivers the moderation engine's messages through the Telegram bot.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
    channel_id: ChatId,
    /// Username of this bot, for telling channel readers who to DM.
    bot_username: Option<String>,
}

impl TelegramGateway {
    pub fn new(bot: Bot, channel_id: ChatId, bot_username: Option<String>) -> Self {
        Self {
            bot,
            channel_id,
            bot_username,
        }
    }

    /// Send pre-rendered HTML parts in order, with the keyboard on the last one.
    /// Returns the ID of the first message.
    ///
    /// Either every part gets sent, or none stay behind.
    async fn send_parts(
        &self,
        chat_id: ChatId,
        parts: &Parts,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<MessageId, RequestError> {
        send_all_or_nothing(
            parts,
            |part, is_last| {
                let mut request = self
                    .bot
                    .send_message(chat_id, part)
                    .parse_mode(ParseMode::Html)
                    .disable_link_preview(true);

                if is_last {
                    if let Some(keyboard) = keyboard {
                        request = request.reply_markup(keyboard.clone());
                    }
                }

                async move { request.await.map(|x| x.id) }
            },
            |message_id| {
                let request = self.bot.delete_message(chat_id, message_id);
                async move { request.await.map(|_| ()) }
            },
        )
        .await
    }
}

/// Send a message, waiting and trying again if Telegram says to slow down.
async fn send_with_retries<T, F, Fut>(mut send: F) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut attempt = 1;
    loop {
        match send().await {
            Err(RequestError::RetryAfter(wait)) if attempt < SEND_ATTEMPTS => {
                let wait = wait.duration();
                log::warn!("Flood control hit, trying again in {wait:?}.");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Send every part in order with `send`. If one of them fails for good, delete
/// the ones already sent with `delete`, so that trying again later doesn't
/// leave the start of the text there twice.
///
/// Returns the ID of the first message.
async fn send_all_or_nothing<S, SFut, D, DFut>(
    parts: &Parts,
    mut send: S,
    mut delete: D,
) -> Result<MessageId, RequestError>
where
    S: FnMut(&str, bool) -> SFut,
    SFut: Future<Output = Result<MessageId, RequestError>>,
    D: FnMut(MessageId) -> DFut,
    DFut: Future<Output = Result<(), RequestError>>,
{
    let count = parts.len();
    let mut sent = Vec::with_capacity(count);

    for (index, part) in parts.iter().enumerate() {
        let is_last = index + 1 == count;
        match send_with_retries(|| send(part, is_last)).await {
            Ok(message_id) => sent.push(message_id),
            Err(e) => {
                if !sent.is_empty() {
                    log::warn!(
                        "Part {} of {count} failed to send, deleting the {} before it.",
                        index + 1,
                        sent.len()
                    );
                }
                for &message_id in sent.iter().rev() {
                    if let Err(delete_error) = delete(message_id).await {
                        log::error!("Failed to delete message {}: {delete_error}", message_id.0);
                    }
                }
                return Err(e);
            }
        }
    }

    Ok(sent[0])
}

impl Gateway for TelegramGateway {
    async fn send_review_request(
        &self,
        reviewer: UserId,
        request: &ReviewRequest,
    ) -> Result<(), GatewayError> {
        let parts = render_review_request(request);
        let keyboard = review_keyboard(request.kind(), request.raw_id());
        self.send_parts(ChatId::from(reviewer), &parts, Some(&keyboard))
            .await?;
        Ok(())
    }

    async fn publish(&self, post: &ChannelPost) -> Result<MessageId, GatewayError> {
        let parts = render_channel_post(post, self.bot_username.as_deref());
        // Advice and later parts hang off the first message.
        Ok(self.send_parts(self.channel_id, &parts, None).await?)
    }
}

/// Approve/reject buttons for a pending item.
pub fn review_keyboard(kind: ItemKind, id: i64) -> InlineKeyboardMarkup {
    let button = |label: &str, decision| {
        InlineKeyboardButton::callback(
            label.to_string(),
            ReviewCallbackData { decision, kind, id }.to_string(),
        )
    };

    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Approve", Decision::Approve),
        button("❌ Reject", Decision::Reject),
    ]])
}

/// Split user text into HTML-escaped parts, with the header glued to the first
/// part and the footer to the last.
fn render_parts(header: &str, body: &str, footer: &str) -> Parts {
    let mut split = split_for_telegram(body, BODY_LIMIT)
        .into_iter()
        .map(|x| encode_text(x).into_owned());

    let mut parts = Parts {
        first: split.next().unwrap_or_default(),
        rest: split.collect(),
    };

    parts.first.insert_str(0, header);
    match parts.rest.last_mut() {
        Some(last) => last.push_str(footer),
        None => parts.first.push_str(footer),
    }

    parts
}

/// Text reviewers get for a pending item.
pub fn render_review_request(request: &ReviewRequest) -> Parts {
    match request {
        ReviewRequest::Story { id, text } => render_parts(
            &format!("📝 <b>New anonymous story</b> (ID {id}):\n\n"),
            text,
            "",
        ),
        ReviewRequest::Advice { id, story_id, text } => render_parts(
            &format!("💬 <b>New advice for story #{story_id}</b> (advice ID {id}):\n\n"),
            text,
            "",
        ),
    }
}

/// Text of a channel post.
pub fn render_channel_post(post: &ChannelPost, bot_username: Option<&str>) -> Parts {
    match post {
        ChannelPost::Story { id, text } => {
            let footer = match bot_username {
                Some(username) => format!(
                    "\n\n💬 To give advice, send <code>/advice {id}</code> to @{username}"
                ),
                None => format!("\n\n💬 To give advice, send <code>/advice {id}</code> to this bot"),
            };
            render_parts(
                &format!("🕊️ <b>Anonymous story #{id}</b>\n\n"),
                text,
                &footer,
            )
        }
        ChannelPost::Advice { story_id, text } => render_parts(
            &format!("💬 <b>Anonymous advice for story #{story_id}</b>\n\n"),
            text,
            "",
        ),
    }
}
