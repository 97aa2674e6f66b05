//! Service configuration.
//!
//! Loaded from JSON; every field has a default, so `{}` is a valid config:
//!
//! ```json
//! {
//!   "trigger": "confluence",
//!   "bot_user_id": "confluence-bot",
//!   "storage": { "backend": "file", "path": "./subscriptions", "cache_size": 1000 },
//!   "manager": { "codec": "message_pack", "serialize_same_key": true }
//! }
//! ```

use crate::command::DEFAULT_TRIGGER;
use crate::error::{Result, SubscriptionError};
use crate::kv::FileKvConfig;
use crate::manager::ManagerOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Where the index lives.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local; lost on restart.
    #[default]
    Memory,
    File(FileKvConfig),
}

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Slash command trigger word.
    pub trigger: String,

    /// User id command responses are authored by.
    pub bot_user_id: String,

    pub storage: StorageConfig,

    pub manager: ManagerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER.to_string(),
            bot_user_id: String::new(),
            storage: StorageConfig::default(),
            manager: ManagerOptions::default(),
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| SubscriptionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trigger.trim().is_empty() || self.trigger.contains(char::is_whitespace) {
            return Err(SubscriptionError::Config(format!(
                "trigger must be a single word, got {:?}",
                self.trigger
            )));
        }
        if self.bot_user_id.trim().is_empty() {
            return Err(SubscriptionError::Config("bot_user_id is required".into()));
        }
        if self.manager.lock_stripes == 0 {
            return Err(SubscriptionError::Config("lock_stripes must be positive".into()));
        }
        if let StorageConfig::File(file) = &self.storage {
            if file.path.as_os_str().is_empty() {
                return Err(SubscriptionError::Config("storage path is required".into()));
            }
        }
        Ok(())
    }
}
