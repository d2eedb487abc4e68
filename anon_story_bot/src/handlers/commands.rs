use teloxide::types::BotCommand;

use crate::{AdviceArgError, StoryId};

pub struct Command {
    pub callname: &'static str,
    pub description: &'static str,
    /// Only shown to, and only works for, admins.
    pub admin_only: bool,
}

pub const START: Command = Command {
    callname: "/start",
    description: "How to use this bot",
    admin_only: false,
};

pub const HELP: Command = Command {
    callname: "/help",
    description: "How to use this bot",
    admin_only: false,
};

pub const ADVICE: Command = Command {
    callname: "/advice <story_id>",
    description: "Send anonymous advice for a published story",
    admin_only: false,
};

pub const PENDING: Command = Command {
    callname: "/pending",
    description: "Get review buttons for everything still waiting for a decision",
    admin_only: true,
};

pub const COMMANDS: &[Command] = &[START, HELP, ADVICE, PENDING];

/// A command this bot knows, with whatever text came after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParsedCommand<'a> {
    Start,
    Help,
    Advice(&'a str),
    Pending,
    Unknown,
}

impl Command {
    pub fn is_matching_callname(&self, command: &str) -> bool {
        self.callname
            .split_ascii_whitespace()
            .next()
            .is_some_and(|x| x.eq_ignore_ascii_case(command))
    }

    pub fn generate_bot_commands(include_admin_only: bool) -> Vec<BotCommand> {
        let mut output = Vec::new();

        for command in COMMANDS {
            if command.admin_only && !include_admin_only {
                continue;
            }
            let Some(callname) = command.callname.split_ascii_whitespace().next() else {
                continue;
            };

            // Cut off the /
            let callname = callname.trim_start_matches('/').to_string();

            output.push(BotCommand {
                command: callname,
                description: command.description.to_string(),
            });
        }

        output
    }
}

/// Figure out which command this message text is. Returns [`None`] if it's
/// not a command at all, or if it's meant for some other bot.
pub fn parse_command<'a>(text: &'a str, bot_username: &str) -> Option<ParsedCommand<'a>> {
    if !text.starts_with('/') {
        return None;
    }

    let command = text.split_whitespace().next()?;
    let params = text[command.len()..].trim();

    // Commands shouldn't have an "@" in their callnames.
    // If the command is "/advice@Some_Bot", trim the "@" and everything after it.
    let callname = if let Some(username_start) = command.find('@') {
        // While we're here, also check if the username is actually ours.
        // Bot names are guaranteed ASCII, so ignore ASCII case specifically.
        if !command[username_start + '@'.len_utf8()..].eq_ignore_ascii_case(bot_username) {
            // This command is not for us. Ignore.
            return None;
        }
        &command[..username_start]
    } else {
        command
    };

    let parsed = if START.is_matching_callname(callname) {
        ParsedCommand::Start
    } else if HELP.is_matching_callname(callname) {
        ParsedCommand::Help
    } else if ADVICE.is_matching_callname(callname) {
        ParsedCommand::Advice(params)
    } else if PENDING.is_matching_callname(callname) {
        ParsedCommand::Pending
    } else {
        ParsedCommand::Unknown
    };

    Some(parsed)
}

/// Parse the story ID out of whatever followed `/advice`.
pub fn parse_advice_args(params: &str) -> Result<StoryId, AdviceArgError> {
    let arg = params
        .split_whitespace()
        .next()
        .ok_or(AdviceArgError::Missing)?;

    // Only plain digits. `str::parse` would let "+5" through.
    if !arg.bytes().all(|x| x.is_ascii_digit()) {
        return Err(AdviceArgError::NotANumber(arg.to_string()));
    }

    arg.parse()
        .map_err(|_| AdviceArgError::NotANumber(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Validate that bot commands match requirements by Telegram's Bot API
    fn validate_bot_commands() {
        let public = Command::generate_bot_commands(false);
        let all = Command::generate_bot_commands(true);
        assert!(public.iter().all(|x| x.command != "pending"));
        assert!(all.iter().any(|x| x.command == "pending"));

        // "At most 100 commands can be specified"
        // - https://core.telegram.org/bots/api#setmycommands
        assert!(all.len() <= 100);
        #[allow(clippy::len_zero)] // It's clearer here this way in context lol
        for command in all {
            // Everything here is from https://core.telegram.org/bots/api#botcommand
            // "Text of the command; 1-32 characters."
            assert!(command.command.len() >= 1);
            assert!(command.command.len() <= 32);

            // "Can contain only lowercase English letters, digits and underscores."
            for chr in command.command.chars() {
                let is_lowercase_latin = chr.is_ascii_alphabetic() && chr.is_ascii_lowercase();
                let is_digit = chr.is_ascii_digit();
                let is_underscore = chr == '_';

                assert!(is_lowercase_latin || is_digit || is_underscore);
            }

            // "Description of the command; 1-256 characters."
            assert!(command.description.len() >= 1);
            assert!(command.description.len() <= 256);
        }
    }

    #[test]
    fn parsing_commands() {
        let bot = "Anon_Story_Bot";
        assert_eq!(parse_command("hello", bot), None);
        assert_eq!(parse_command("/start", bot), Some(ParsedCommand::Start));
        assert_eq!(parse_command("/HELP", bot), Some(ParsedCommand::Help));
        assert_eq!(
            parse_command("/advice  12 ", bot),
            Some(ParsedCommand::Advice("12"))
        );
        assert_eq!(
            parse_command("/advice@anon_story_bot 3", bot),
            Some(ParsedCommand::Advice("3"))
        );
        assert_eq!(parse_command("/advice@OtherBot 3", bot), None);
        assert_eq!(parse_command("/pending", bot), Some(ParsedCommand::Pending));
        assert_eq!(parse_command("/amogus", bot), Some(ParsedCommand::Unknown));
    }

    #[test]
    fn parsing_advice_args() {
        assert_eq!(parse_advice_args("12"), Ok(StoryId(12)));
        assert_eq!(parse_advice_args("7 and more"), Ok(StoryId(7)));
        assert_eq!(parse_advice_args(""), Err(AdviceArgError::Missing));
        assert_eq!(parse_advice_args("   "), Err(AdviceArgError::Missing));
        assert!(matches!(
            parse_advice_args("twelve"),
            Err(AdviceArgError::NotANumber(_))
        ));
        assert!(matches!(
            parse_advice_args("+5"),
            Err(AdviceArgError::NotANumber(_))
        ));
        assert!(matches!(
            parse_advice_args("-5"),
            Err(AdviceArgError::NotANumber(_))
        ));
        assert!(matches!(
            parse_advice_args("99999999999999999999999"),
            Err(AdviceArgError::NotANumber(_))
        ));
    }
}
