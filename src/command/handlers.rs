//! Handlers of the subscription commands.

use super::{BotContext, CommandArgs, CommandResponse};
use crate::types::Subscription;
use tracing::error;

const INVALID_COMMAND: &str = "Invalid command";
const LIST_FAILED: &str = "Encountered an error getting channel subscriptions.";
const NO_SUBSCRIPTIONS: &str = "No subscription found for this channel.";
const DELETE_USAGE: &str = "Please specify the alias of the subscription to delete.";
const TABLE_HEADER: &str =
    "| Alias | Base Url | Space Key | Events|\n| :----: |:--------:| :--------:| :-----:|";

/// Fallback for unknown commands.
pub fn execute_default(_ctx: &BotContext, _args: &CommandArgs, _rest: &[&str]) -> CommandResponse {
    CommandResponse::ephemeral(INVALID_COMMAND)
}

/// `list`: post the invoking channel's subscriptions as a table.
pub fn list_subscriptions(ctx: &BotContext, args: &CommandArgs, _rest: &[&str]) -> CommandResponse {
    match ctx.manager.list_subscriptions(&args.channel_id) {
        Ok(subscriptions) if subscriptions.is_empty() => ctx.post_response(args, NO_SUBSCRIPTIONS),
        Ok(subscriptions) => ctx.post_response(args, render_subscription_table(&subscriptions)),
        Err(err) => {
            error!(channel_id = %args.channel_id, error = %err, "listing subscriptions failed");
            ctx.post_response(args, LIST_FAILED);
        }
    }
    CommandResponse::empty()
}

/// `delete <alias>`: remove one of the invoking channel's subscriptions.
pub fn delete_subscription(ctx: &BotContext, args: &CommandArgs, rest: &[&str]) -> CommandResponse {
    let Some(alias) = rest.first() else {
        ctx.post_response(args, DELETE_USAGE);
        return CommandResponse::empty();
    };

    let message = match ctx.manager.delete_subscription(&args.channel_id, alias) {
        Ok(_) => format!("Subscription with alias **{alias}** deleted successfully."),
        Err(err) if err.is_not_found() => format!("Subscription with alias **{alias}** not found."),
        Err(err) => {
            error!(channel_id = %args.channel_id, alias, error = %err, "deleting subscription failed");
            format!("Error occured while deleting subscription with alias **{alias}**.")
        }
    };
    ctx.post_response(args, message);
    CommandResponse::empty()
}

/// Markdown table with one row per subscription.
pub fn render_subscription_table(subscriptions: &[Subscription]) -> String {
    let mut text = String::from(TABLE_HEADER);
    for subscription in subscriptions {
        text.push_str(&format!(
            "\n|{}|{}|{}|{}|",
            subscription.alias,
            subscription.base_url,
            subscription.space_key,
            subscription.events.join(", ")
        ));
    }
    text
}
