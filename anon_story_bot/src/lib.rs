//! Source code for an anonymous story bot: people send stories and advice
//! to it privately, admins approve or reject them, and approved ones get
//! posted to a channel without any trace of who wrote them.

/// Various types used throughout.
mod types;
pub use types::*;

/// Error types.
mod error;
pub use error::*;

/// Startup configuration.
mod config;
pub use config::{Config, ConfigError};

/// The database.
pub mod database;

/// Pending item moderation: submissions, fan-out to reviewers and decisions.
pub mod moderation;

/// Per-user conversation state.
pub mod conversation;

/// Talking to Telegram on behalf of the moderation engine.
mod gateway;
pub use gateway::TelegramGateway;

/// Miscellaneous functions.
mod misc;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;
