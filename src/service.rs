//! Service wiring configuration, storage, manager and command dispatch.

use crate::command::{
    BotContext, CommandArgs, CommandDescriptor, CommandHandler, CommandResponse, EphemeralPoster,
};
use crate::config::{Config, StorageConfig};
use crate::error::Result;
use crate::kv::{FileKvStore, KvStore, MemoryKvStore};
use crate::manager::SubscriptionManager;
use std::sync::Arc;
use tracing::{debug, info};

/// The running subscription service.
///
/// Built once at startup and dropped at shutdown; there is no global state.
pub struct SubscriptionService {
    config: Config,
    context: BotContext,
    commands: CommandHandler,
}

impl SubscriptionService {
    /// Open the configured store and wire everything together.
    pub fn open(config: Config, poster: Arc<dyn EphemeralPoster>) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn KvStore> = match &config.storage {
            StorageConfig::Memory => Arc::new(MemoryKvStore::new()),
            StorageConfig::File(file) => Arc::new(FileKvStore::open_or_create(file.clone())?),
        };
        Self::with_store(config, store, poster)
    }

    /// Wire the service around an existing store.
    pub fn with_store(
        config: Config,
        store: Arc<dyn KvStore>,
        poster: Arc<dyn EphemeralPoster>,
    ) -> Result<Self> {
        config.validate()?;
        let manager = Arc::new(SubscriptionManager::with_options(store, &config.manager));
        let context = BotContext::new(config.bot_user_id.clone(), manager, poster);

        info!(trigger = %config.trigger, "subscription service started");
        Ok(Self {
            config,
            context,
            commands: CommandHandler::standard(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &SubscriptionManager {
        &self.context.manager
    }

    /// Registration details for the slash command.
    pub fn command(&self) -> CommandDescriptor {
        CommandDescriptor::for_trigger(&self.config.trigger)
    }

    /// Handle one slash command invocation.
    pub fn execute_command(&self, args: &CommandArgs) -> CommandResponse {
        debug!(channel_id = %args.channel_id, user_id = %args.user_id, "executing command");
        self.commands.execute(&self.context, args)
    }
}
