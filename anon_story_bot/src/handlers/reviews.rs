use std::sync::Arc;

use teloxide::{
    prelude::*,
    sugar::request::RequestLinkPreviewExt,
    types::{InlineKeyboardMarkup, ParseMode},
    ApiError, RequestError,
};

use crate::{
    gateway::review_keyboard,
    misc::user_name_prettyprint,
    moderation::{AdviceOutcome, Gateway, ModerationEngine, StoryOutcome},
    AdviceId, Config, Decision, ItemKind, ModerationError, ReviewCallbackData, StoryId,
};

use super::BotEngine;

/// What to do with the review message whose button was pressed.
#[derive(Debug, PartialEq, Eq)]
enum ReviewMessageUpdate {
    /// The presser decided it. Replace the text, credit them, and drop the buttons.
    Decided(String),
    /// Nothing left to decide. Replace the text and drop the buttons.
    Stale(String),
    /// Replace the text, but keep the buttons so they can be pressed again.
    Retry(String),
}

pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    engine: Arc<BotEngine>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    macro_rules! goodbye {
        ($text:expr) => {
            bot.answer_callback_query(query.id.clone()).text($text).await?;
            return Ok(());
        };
    }

    let user = &query.from;

    let data = match check_review_press(&config, user.id, query.data.as_deref()) {
        Ok(x) => x,
        Err(text) => {
            goodbye!(text);
        }
    };

    // Answer right away. Posting to the channel may take a while, and the
    // button shouldn't keep spinning, whatever happens next.
    if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
        log::warn!("Failed to answer a callback query: {e}");
    }

    log::info!(
        "{} decided to {:?} {} #{}.",
        user.id,
        data.decision,
        data.kind,
        data.id
    );

    let update = apply_decision(&*engine, data).await;

    let Some(message) = &query.message else {
        // May happen if the message is too old. The decision is applied either way.
        log::debug!("No message to update for {} #{}.", data.kind, data.id);
        return Ok(());
    };

    let (chat_id, message_id) = (message.chat().id, message.id());
    let (text, keyboard) = review_message(update, &user_name_prettyprint(user, false), data);

    let edit_result = bot
        .edit_message_text(chat_id, message_id, text)
        .parse_mode(ParseMode::Html)
        .disable_link_preview(true)
        .reply_markup(keyboard)
        .await;

    match edit_result {
        Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => (),
        Err(e) => return Err(e),
    }

    Ok(())
}

/// Make sure a button press comes from an admin and carries a decision.
/// On failure, returns what to tell the presser.
fn check_review_press(
    config: &Config,
    user: UserId,
    query_data: Option<&str>,
) -> Result<ReviewCallbackData, String> {
    let Some(query_data) = query_data else {
        return Err("No query data.".to_string());
    };

    if !config.is_admin(user) {
        log::warn!("{user} tried to press a review button without being an admin.");
        return Err("Access denied.".to_string());
    }

    query_data
        .parse()
        .map_err(|e| format!("Invalid query data: {e}"))
}

/// New text and buttons for the pressed review message.
fn review_message(
    update: ReviewMessageUpdate,
    handled_by: &str,
    data: ReviewCallbackData,
) -> (String, InlineKeyboardMarkup) {
    let no_buttons = InlineKeyboardMarkup {
        inline_keyboard: Vec::new(),
    };

    match update {
        ReviewMessageUpdate::Decided(text) => (format!("{text}\nHandled by {handled_by}"), no_buttons),
        ReviewMessageUpdate::Stale(text) => (text, no_buttons),
        ReviewMessageUpdate::Retry(text) => (text, review_keyboard(data.kind, data.id)),
    }
}

/// Run the decision through the engine, and figure out what reviewers should see.
async fn apply_decision<G: Gateway>(
    engine: &ModerationEngine<G>,
    data: ReviewCallbackData,
) -> ReviewMessageUpdate {
    let result = match data.kind {
        ItemKind::Story => engine
            .decide_story(StoryId(data.id), data.decision)
            .await
            .map(|outcome| match outcome {
                StoryOutcome::Published(story) => format!(
                    "✅ Story #{} approved and posted to the channel.",
                    story.id
                ),
                StoryOutcome::Discarded(id) => format!("❌ Story #{id} rejected."),
            }),
        ItemKind::Advice => engine
            .decide_advice(AdviceId(data.id), data.decision)
            .await
            .map(|outcome| match outcome {
                AdviceOutcome::Published { advice, .. } => format!(
                    "✅ Advice #{} for story #{} approved and posted to the channel.",
                    advice.id, advice.story_id
                ),
                AdviceOutcome::Discarded(advice) => format!(
                    "❌ Advice #{} for story #{} rejected.",
                    advice.id, advice.story_id
                ),
            }),
    };

    match result {
        Ok(text) => ReviewMessageUpdate::Decided(text),
        Err(ModerationError::NotFound { kind, id }) => ReviewMessageUpdate::Stale(format!(
            "⚠️ {} #{id} is not pending anymore. Someone else probably handled it already.",
            kind.capitalized()
        )),
        Err(ModerationError::PublishFailure(e)) => ReviewMessageUpdate::Retry(format!(
            "❌ Could not post {} #{} to the channel: {}\nIs the bot an admin there? It is still pending, press Approve again to retry, or send /pending to see it again.",
            data.kind,
            data.id,
            html_escape::encode_text(&e.to_string())
        )),
        Err(e) => {
            log::error!("Failed to {:?} {} #{}: {e}", data.decision, data.kind, data.id);
            let what = match data.decision {
                Decision::Approve => "approve",
                Decision::Reject => "reject",
            };
            ReviewMessageUpdate::Retry(format!(
                "😵 Could not {what} {} #{} because of an internal error. It is still pending, try again later, or send /pending to see it again.",
                data.kind, data.id
            ))
        }
    }
}

/// Send everything that still waits for a decision to this reviewer, with
/// fresh buttons.
pub async fn send_pending_reviews(
    bot: &Bot,
    chat_id: ChatId,
    reviewer: UserId,
    engine: &BotEngine,
) -> Result<(), RequestError> {
    let items = match engine.pending_items().await {
        Ok(x) => x,
        Err(e) => {
            log::error!("Failed to list pending items: {e}");
            bot.send_message(chat_id, "😵 Could not get pending items, try again later.")
                .await?;
            return Ok(());
        }
    };

    if items.is_empty() {
        bot.send_message(chat_id, "Nothing is pending right now. 🎉")
            .await?;
        return Ok(());
    }

    bot.send_message(chat_id, format!("{} item(s) waiting for review:", items.len()))
        .await?;

    let mut failed = 0;
    for item in &items {
        if let Err(e) = engine.send_review_request(reviewer, item).await {
            log::warn!(
                "Failed to resend {} #{} to {reviewer}: {e}",
                item.kind(),
                item.raw_id()
            );
            failed += 1;
        }
    }

    if failed > 0 {
        bot.send_message(
            chat_id,
            format!("⚠️ {failed} of them could not be sent. Try /pending again later."),
        )
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::moderation::mock::{config, setup, PublishMode, ADMIN_A};

    const SUBMITTER: UserId = UserId(1000);

    fn press(decision: Decision, kind: ItemKind, id: i64) -> ReviewCallbackData {
        ReviewCallbackData { decision, kind, id }
    }

    #[test]
    fn only_admins_get_to_decide() {
        let config = config();

        assert_eq!(
            check_review_press(&config, SUBMITTER, Some("APPROVE STORY 1")),
            Err("Access denied.".to_string())
        );
        assert_eq!(
            check_review_press(&config, ADMIN_A, None),
            Err("No query data.".to_string())
        );
        assert!(check_review_press(&config, ADMIN_A, Some("YOLO STORY 1"))
            .unwrap_err()
            .starts_with("Invalid query data: "));
        assert_eq!(
            check_review_press(&config, ADMIN_A, Some("REJECT ADVICE 9")),
            Ok(press(Decision::Reject, ItemKind::Advice, 9))
        );
    }

    #[tokio::test]
    async fn decided_item_credits_the_reviewer() {
        let (_dir, engine, _gateway) = setup().await;
        let id = engine.submit_story("a story", SUBMITTER).await.unwrap().id;
        let data = press(Decision::Approve, ItemKind::Story, id.0);

        let update = apply_decision(&engine, data).await;
        assert_eq!(
            update,
            ReviewMessageUpdate::Decided(format!(
                "✅ Story #{id} approved and posted to the channel."
            ))
        );

        let (text, keyboard) = review_message(update, "@admin", data);
        assert!(text.ends_with("\nHandled by @admin"));
        assert!(keyboard.inline_keyboard.is_empty());
    }

    #[tokio::test]
    async fn late_press_is_not_credited() {
        let (_dir, engine, gateway) = setup().await;
        let id = engine.submit_story("a story", SUBMITTER).await.unwrap().id;

        let reject = press(Decision::Reject, ItemKind::Story, id.0);
        assert!(matches!(
            apply_decision(&engine, reject).await,
            ReviewMessageUpdate::Decided(_)
        ));

        // Someone else presses Approve on their copy afterwards.
        let approve = press(Decision::Approve, ItemKind::Story, id.0);
        let update = apply_decision(&engine, approve).await;
        assert_eq!(
            update,
            ReviewMessageUpdate::Stale(format!(
                "⚠️ Story #{id} is not pending anymore. Someone else probably handled it already."
            ))
        );
        assert!(gateway.posts().is_empty());

        let (text, keyboard) = review_message(update, "@late", approve);
        assert!(!text.contains("Handled by"));
        assert!(keyboard.inline_keyboard.is_empty());
    }

    #[tokio::test]
    async fn unknown_advice_is_stale() {
        let (_dir, engine, _gateway) = setup().await;

        let update = apply_decision(&engine, press(Decision::Approve, ItemKind::Advice, 5)).await;
        assert!(matches!(
            update,
            ReviewMessageUpdate::Stale(text) if text.starts_with("⚠️ Advice #5 is not pending anymore.")
        ));
    }

    #[tokio::test]
    async fn publish_failure_keeps_the_buttons() {
        let (_dir, engine, gateway) = setup().await;
        let id = engine.submit_story("a story", SUBMITTER).await.unwrap().id;
        let data = press(Decision::Approve, ItemKind::Story, id.0);

        gateway.set_publish_mode(PublishMode::Fails);
        let update = apply_decision(&engine, data).await;
        assert!(matches!(
            &update,
            ReviewMessageUpdate::Retry(text) if text.starts_with(&format!("❌ Could not post story #{id} to the channel: "))
        ));

        let (text, keyboard) = review_message(update, "@admin", data);
        assert!(!text.contains("Handled by"));
        assert_eq!(keyboard, review_keyboard(ItemKind::Story, id.0));

        // Pressing the kept button again goes through.
        gateway.set_publish_mode(PublishMode::Works);
        assert!(matches!(
            apply_decision(&engine, data).await,
            ReviewMessageUpdate::Decided(_)
        ));
        assert_eq!(gateway.posts().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_keeps_the_buttons() {
        let (_dir, engine, _gateway) = setup().await;
        let id = engine.submit_story("a story", SUBMITTER).await.unwrap().id;
        let data = press(Decision::Reject, ItemKind::Story, id.0);

        engine.database().close().await;

        let update = apply_decision(&engine, data).await;
        assert!(matches!(
            &update,
            ReviewMessageUpdate::Retry(text) if text.starts_with(&format!("😵 Could not reject story #{id} "))
        ));

        let (_, keyboard) = review_message(update, "@admin", data);
        assert_eq!(keyboard, review_keyboard(ItemKind::Story, id.0));
    }
}
