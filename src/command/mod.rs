//! Chat command surface.
//!
//! The platform hands over the raw command text; the first token is the
//! trigger word and is stripped before routing:
//!
//! ```text
//! /confluence list            -> list_subscriptions
//! /confluence delete <alias>  -> delete_subscription
//! /confluence <anything else> -> "Invalid command"
//! ```
//!
//! Handlers answer with ephemeral posts authored by the bot user. Everything
//! they need comes from the [`BotContext`] built at startup.

mod handlers;
mod router;

pub use handlers::{
    delete_subscription, execute_default, list_subscriptions, render_subscription_table,
};
pub use router::{CommandHandler, CommandHandlerFn};

use crate::manager::SubscriptionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Default trigger word.
pub const DEFAULT_TRIGGER: &str = "confluence";

/// A command invocation as delivered by the chat platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandArgs {
    /// User who typed the command.
    pub user_id: String,
    /// Channel the command was typed in.
    pub channel_id: String,
    /// Full command text, trigger included.
    pub command: String,
}

impl CommandArgs {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            command: command.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    #[default]
    Ephemeral,
    InChannel,
}

/// Direct response to a command. Empty when the handler answered by post.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub response_type: ResponseType,
    pub text: String,
}

impl CommandResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Ephemeral,
            text: text.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A message posted into a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Author; always the bot user for command responses.
    pub user_id: String,
    pub channel_id: String,
    pub message: String,
}

#[derive(Debug, Error)]
#[error("Ephemeral post failed: {0}")]
pub struct PostError(pub String);

/// Delivers posts visible only to one user.
pub trait EphemeralPoster: Send + Sync {
    fn send_ephemeral(&self, user_id: &str, post: Post) -> Result<(), PostError>;
}

/// Everything command handlers need, built once at startup.
pub struct BotContext {
    pub bot_user_id: String,
    pub manager: Arc<SubscriptionManager>,
    pub poster: Arc<dyn EphemeralPoster>,
}

impl BotContext {
    pub fn new(
        bot_user_id: impl Into<String>,
        manager: Arc<SubscriptionManager>,
        poster: Arc<dyn EphemeralPoster>,
    ) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            manager,
            poster,
        }
    }

    /// Answer the invoking user in the invoking channel. Delivery failures are
    /// logged, not returned: the command itself already happened.
    pub fn post_response(&self, args: &CommandArgs, text: impl Into<String>) {
        let post = Post {
            user_id: self.bot_user_id.clone(),
            channel_id: args.channel_id.clone(),
            message: text.into(),
        };
        if let Err(err) = self.poster.send_ephemeral(&args.user_id, post) {
            warn!(user_id = %args.user_id, channel_id = %args.channel_id, error = %err, "command response not delivered");
        }
    }
}

/// Slash command registration details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub trigger: String,
    pub display_name: String,
    pub description: String,
    pub auto_complete: bool,
    pub auto_complete_desc: String,
    pub auto_complete_hint: String,
}

impl CommandDescriptor {
    pub fn for_trigger(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            display_name: "Confluence".into(),
            description: "Integration with Confluence.".into(),
            auto_complete: true,
            auto_complete_desc: "Available commands: subscribe, list".into(),
            auto_complete_hint: "[command]".into(),
        }
    }
}

impl Default for CommandDescriptor {
    fn default() -> Self {
        Self::for_trigger(DEFAULT_TRIGGER)
    }
}
