use std::sync::Arc;

use teloxide::{
    prelude::*,
    sugar::request::RequestReplyExt,
    types::{Me, ParseMode},
    RequestError,
};

use crate::{
    conversation::{ConversationRouter, Mode, Route},
    gateway::TelegramGateway,
    moderation::{Gateway, ModerationEngine, Submission},
    AdviceArgError, Config, ModerationError, StoryId,
};

use self::commands::{parse_advice_args, parse_command, ParsedCommand};
pub use self::commands::Command;
pub use self::reviews::handle_callback_query;

pub mod commands;
pub mod reviews;

/// The engine as the bot runs it.
pub type BotEngine = ModerationEngine<TelegramGateway>;

const WELCOME_TEXT: &str = "👋 Hi! This bot lets you share stories anonymously.

✍️ Just send me your story as a text message. Admins will read it, and if they approve it, it gets posted to the channel. Nobody there will see who wrote it.

💬 Want to give advice on a story from the channel? Send <code>/advice &lt;story ID&gt;</code>, and then send your advice as the next message. It is reviewed and posted anonymously too.";

const NOT_TEXT: &str = "Sorry, only text messages are accepted.";

const SOMETHING_BROKE: &str = "😵 Something went wrong on our side. Please try again later.";

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    engine: Arc<BotEngine>,
    router: Arc<ConversationRouter>,
    config: Arc<Config>,
) -> Result<(), RequestError> {
    // Submissions only make sense in private.
    if !message.chat.is_private() {
        return Ok(());
    }

    let Some(user) = &message.from else {
        return Ok(());
    };

    if user.id == me.user.id {
        return Ok(());
    }

    let Some(text) = message.text() else {
        bot.send_message(message.chat.id, NOT_TEXT)
            .reply_to(message.id)
            .await?;
        return Ok(());
    };

    if text.starts_with('/') {
        let username = me.user.username.as_deref().unwrap_or_default();
        let Some(command) = parse_command(text, username) else {
            // Meant for some other bot.
            return Ok(());
        };

        return handle_command(&bot, &message, user.id, command, &engine, &router, &config)
            .await;
    }

    let reply = match router.route(user.id) {
        Route::NewStory => match engine.submit_story(text, user.id).await {
            Ok(submission) => {
                log_submission("Story", &submission);
                "✅ Thank you! Your story was sent to the admins and will be posted anonymously if approved.".to_string()
            }
            Err(e) => submission_error_reply(&e, None),
        },
        Route::Advice(story_id) => match engine.submit_advice(story_id, text, user.id).await {
            Ok(submission) => {
                log_submission("Advice", &submission);
                format!("✅ Thank you! Your advice for story #{story_id} was sent to the admins and will be posted anonymously if approved.")
            }
            Err(e) => submission_error_reply(&e, Some(story_id)),
        },
    };

    bot.send_message(message.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .reply_to(message.id)
        .await?;

    Ok(())
}

fn log_submission<Id: std::fmt::Display>(what: &str, submission: &Submission<Id>) {
    if !submission.reached_anyone() {
        // Already yelled about by the engine. The submitter doesn't need to know.
        return;
    }

    let reached = submission
        .deliveries
        .iter()
        .filter(|x| x.result.is_ok())
        .count();

    log::info!(
        "{what} #{} queued, {reached}/{} reviewers notified.",
        submission.id,
        submission.deliveries.len()
    );
}

/// What to tell the submitter when their submission didn't go through.
fn submission_error_reply(error: &ModerationError, advice_for: Option<StoryId>) -> String {
    if error.is_validation() {
        log::debug!("Refused a submission: {error}");
    } else {
        log::error!("Failed to queue a submission: {error}");
    }

    match (error, advice_for) {
        (ModerationError::EmptyText, _) => "Please send some actual text.".to_string(),
        (_, Some(story_id)) => format!(
            "{SOMETHING_BROKE}\nYour advice was not saved. Send <code>/advice {story_id}</code> to try again."
        ),
        (_, None) => SOMETHING_BROKE.to_string(),
    }
}

/// What a command results in.
#[derive(Debug, PartialEq, Eq)]
enum CommandAction {
    Reply(String),
    /// Resend everything pending to the admin who asked.
    SendPending,
}

async fn handle_command(
    bot: &Bot,
    message: &Message,
    user: UserId,
    command: ParsedCommand<'_>,
    engine: &BotEngine,
    router: &ConversationRouter,
    config: &Config,
) -> Result<(), RequestError> {
    let reply = match command_action(user, command, engine, router, config).await {
        CommandAction::Reply(x) => x,
        CommandAction::SendPending => {
            return reviews::send_pending_reviews(bot, message.chat.id, user, engine).await;
        }
    };

    bot.send_message(message.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .reply_to(message.id)
        .await?;

    Ok(())
}

async fn command_action<G: Gateway>(
    user: UserId,
    command: ParsedCommand<'_>,
    engine: &ModerationEngine<G>,
    router: &ConversationRouter,
    config: &Config,
) -> CommandAction {
    let reply = match command {
        ParsedCommand::Advice(params) => advice_command(user, params, engine, router).await,
        ParsedCommand::Pending if config.is_admin(user) => return CommandAction::SendPending,
        // Non-admins don't get to know /pending exists.
        ParsedCommand::Pending => {
            log::warn!("{user} tried to use /pending without being an admin.");
            WELCOME_TEXT.to_string()
        }
        ParsedCommand::Start
        | ParsedCommand::Help
        | ParsedCommand::Unknown => match router.mode(user) {
            Mode::AwaitingAdvice(story_id) => format!(
                "{WELCOME_TEXT}\n\n✏️ Your next message will be taken as advice for story #{story_id}."
            ),
            Mode::Idle => WELCOME_TEXT.to_string(),
        },
    };

    CommandAction::Reply(reply)
}

/// Handle `/advice <story_id>`, returning the reply text.
async fn advice_command<G: Gateway>(
    user: UserId,
    params: &str,
    engine: &ModerationEngine<G>,
    router: &ConversationRouter,
) -> String {
    let story_id = match parse_advice_args(params) {
        Ok(x) => x,
        Err(e) => return advice_arg_error_reply(user, &e),
    };

    match engine.request_advice(router, user, story_id).await {
        Ok(()) => format!("💬 Please send your advice for story #{story_id} as the next message."),
        Err(ModerationError::StoryNotPublished(_)) => {
            log::warn!("{user} asked to advise on story #{story_id}, which isn't published.");
            format!("There's no published story #{story_id}. Please check the ID.")
        }
        Err(e) => {
            log::error!("Failed to check story #{story_id} for advice: {e}");
            SOMETHING_BROKE.to_string()
        }
    }
}

fn advice_arg_error_reply(user: UserId, error: &AdviceArgError) -> String {
    log::warn!("Rejected /advice from {user}: {error}");

    match error {
        AdviceArgError::Missing => {
            "Please tell me which story this is for, like this: <code>/advice 12</code>".to_string()
        }
        AdviceArgError::NotANumber(_) => {
            "The story ID should be a number, like this: <code>/advice 12</code>".to_string()
        }
    }
}
