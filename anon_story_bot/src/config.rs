use std::{fs, time::Duration};

use teloxide::types::{ChatId, UserId};

const DEFAULT_DATABASE_PATH: &str = "anon_stories.sqlite";
const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 20;

/// Everything the bot needs to know before it can start.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    /// Users allowed to approve and reject submissions.
    pub admins: Vec<UserId>,
    /// Channel where approved stories and advice get posted.
    pub channel_id: ChatId,
    pub database_path: String,
    /// Upper bound on every single request to Telegram made on behalf of the
    /// moderation engine.
    pub transport_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no bot token: set BOT_TOKEN or put it into the {0:?} file")]
    NoToken(&'static str),
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("ADMIN_IDS doesn't list any admins")]
    NoAdmins,
}

impl Config {
    /// Load the configuration from the environment, reading a `.env` file
    /// first if there is one.
    ///
    /// If `BOT_TOKEN` is not set, the token is read from the `key` file, or
    /// `key_debug` in debug builds.
    pub fn load() -> Result<Config, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => (),
            Err(e) => log::warn!("Failed to load .env file: {e}"),
        }

        let key_file = match cfg!(debug_assertions) {
            true => "key_debug",
            false => "key",
        };

        Config::from_lookup(
            |name| std::env::var(name).ok(),
            || fs::read_to_string(key_file).ok(),
            key_file,
        )
    }

    /// Build the configuration out of values provided by `lookup`, falling
    /// back to `read_key_file` for the token.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        read_key_file: impl FnOnce() -> Option<String>,
        key_file_name: &'static str,
    ) -> Result<Config, ConfigError> {
        let bot_token = lookup("BOT_TOKEN")
            .or_else(read_key_file)
            .map(|x| x.trim().to_string())
            .filter(|x| !x.is_empty())
            .ok_or(ConfigError::NoToken(key_file_name))?;

        let admins_raw = lookup("ADMIN_IDS").ok_or(ConfigError::Missing("ADMIN_IDS"))?;
        let admins = parse_admin_ids(&admins_raw)?;

        let channel_raw = lookup("CHANNEL_ID").ok_or(ConfigError::Missing("CHANNEL_ID"))?;
        let channel_id = channel_raw
            .trim()
            .parse()
            .map(ChatId)
            .map_err(|_| ConfigError::Invalid {
                name: "CHANNEL_ID",
                value: channel_raw.clone(),
            })?;

        let database_path = lookup("DATABASE_PATH")
            .map(|x| x.trim().to_string())
            .filter(|x| !x.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let transport_timeout = match lookup("TRANSPORT_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_TRANSPORT_TIMEOUT_SECS),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "TRANSPORT_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
        };

        Ok(Config {
            bot_token,
            admins,
            channel_id,
            database_path,
            transport_timeout,
        })
    }

    /// Returns `true` if this user may review submissions.
    #[must_use]
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }
}

/// Parse a comma separated list of user IDs, skipping blank entries.
fn parse_admin_ids(raw: &str) -> Result<Vec<UserId>, ConfigError> {
    let mut admins = Vec::new();

    for part in raw.split(',').map(str::trim).filter(|x| !x.is_empty()) {
        let id = part.parse().map_err(|_| ConfigError::Invalid {
            name: "ADMIN_IDS",
            value: part.to_string(),
        })?;
        let id = UserId(id);
        if !admins.contains(&id) {
            admins.push(id);
        }
    }

    if admins.is_empty() {
        return Err(ConfigError::NoAdmins);
    }

    Ok(admins)
}
