use std::{process::ExitCode, sync::Arc};

use teloxide::{
    dptree::deps,
    prelude::*,
    types::{BotCommandScope, Recipient},
};

use crate::{
    conversation::ConversationRouter,
    database::Database,
    handlers::{handle_callback_query, handle_message, Command},
    moderation::ModerationEngine,
    Config, TelegramGateway,
};

/// Put the command list into Telegram's UI. Admins also get to see
/// admin-only commands.
async fn register_commands(bot: &Bot, config: &Config) {
    if let Err(e) = bot
        .set_my_commands(Command::generate_bot_commands(false))
        .await
    {
        log::warn!("Failed to set bot commands: {e}");
    }

    for &admin in &config.admins {
        let result = bot
            .set_my_commands(Command::generate_bot_commands(true))
            .scope(BotCommandScope::Chat {
                chat_id: Recipient::Id(ChatId::from(admin)),
            })
            .await;

        if let Err(e) = result {
            // Happens if the admin never started the bot. Not a big deal.
            log::debug!("Failed to set admin commands for {admin}: {e}");
        }
    }
}

pub async fn entry() -> ExitCode {
    log::info!("ASYNC WOOOO");

    let config = match Config::load() {
        Ok(x) => Arc::new(x),
        Err(e) => {
            log::error!("Bad configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let bot = Bot::new(&config.bot_token);

    let me = match bot.get_me().await {
        Ok(x) => x,
        Err(e) => {
            log::error!("Failed to get info about the bot. Is the token right? {e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "Running as @{}, with {} admin(s).",
        me.user.username.as_deref().unwrap_or("???"),
        config.admins.len()
    );

    let database = match Database::new(&config.database_path).await {
        Ok(x) => x,
        Err(e) => {
            log::error!("Failed to open database at {}: {e}", config.database_path);
            return ExitCode::FAILURE;
        }
    };

    register_commands(&bot, &config).await;

    let gateway = TelegramGateway::new(bot.clone(), config.channel_id, me.user.username.clone());
    let engine = Arc::new(ModerationEngine::new(
        database,
        gateway,
        config.admins.clone(),
        config.transport_timeout,
    ));
    let router = Arc::new(ConversationRouter::new());

    log::info!("Creating the handler...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback_query));

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![engine, router, config])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");

    ExitCode::SUCCESS
}
