//! Longest-prefix command routing.

use super::handlers;
use super::{BotContext, CommandArgs, CommandResponse};
use std::collections::HashMap;

/// Handler signature: context, invocation, and the tokens left after the
/// matched command name.
pub type CommandHandlerFn = fn(&BotContext, &CommandArgs, &[&str]) -> CommandResponse;

/// Routes tokenised commands to handlers.
///
/// Multi-word names are stored joined with `/`. For tokens `a b c` the router
/// tries `a/b/c`, then `a/b`, then `a`; the longest registered name wins and
/// the remaining tokens become the handler's arguments. With no match the
/// default handler gets every token.
pub struct CommandHandler {
    handlers: HashMap<String, CommandHandlerFn>,
    default_handler: CommandHandlerFn,
}

impl CommandHandler {
    pub fn new(default_handler: CommandHandlerFn) -> Self {
        Self {
            handlers: HashMap::new(),
            default_handler,
        }
    }

    /// The subscription command table.
    pub fn standard() -> Self {
        Self::new(handlers::execute_default)
            .with("list", handlers::list_subscriptions)
            .with("delete", handlers::delete_subscription)
    }

    /// Register `name` (one or more whitespace-separated words).
    pub fn with(mut self, name: &str, handler: CommandHandlerFn) -> Self {
        let key = name.split_whitespace().collect::<Vec<_>>().join("/");
        self.handlers.insert(key, handler);
        self
    }

    /// Route already-tokenised arguments (trigger removed).
    pub fn handle(&self, ctx: &BotContext, args: &CommandArgs, tokens: &[&str]) -> CommandResponse {
        for n in (1..=tokens.len()).rev() {
            if let Some(handler) = self.handlers.get(&tokens[..n].join("/")) {
                return handler(ctx, args, &tokens[n..]);
            }
        }
        (self.default_handler)(ctx, args, tokens)
    }

    /// Tokenise the raw command text, drop the trigger word and route.
    pub fn execute(&self, ctx: &BotContext, args: &CommandArgs) -> CommandResponse {
        let tokens: Vec<&str> = args.command.split_whitespace().collect();
        let rest = tokens.get(1..).unwrap_or(&[]);
        self.handle(ctx, args, rest)
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::standard()
    }
}
