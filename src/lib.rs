//! # Wiki Subscriptions
//!
//! Chat channels subscribe to events of wiki spaces. The subscription index
//! keeps two views of the same data in a plain key-value store:
//!
//! - **Channel index**: channel id → `alias -> Subscription`
//! - **Reverse index**: `(base URL, space key)` → `channel id -> events`
//!
//! The first answers "what is this channel subscribed to?", the second "which
//! channels care about this space?". The store only offers single-key
//! atomicity, so the [`SubscriptionManager`] orders its writes to keep the
//! views consistent and reports the one window where they can drift.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wiki_subscriptions::{MemoryKvStore, Subscription, SubscriptionManager};
//!
//! let manager = SubscriptionManager::new(Arc::new(MemoryKvStore::new()));
//!
//! manager.create_subscription(Subscription::new(
//!     "eng-pages",
//!     "C1",
//!     "https://wiki.example.com",
//!     "ENG",
//!     ["page_created"],
//! ))?;
//!
//! let channels = manager.channels_for_event("https://wiki.example.com", "ENG", "page_created")?;
//! assert_eq!(channels, vec!["C1"]);
//!
//! manager.delete_subscription("C1", "eng-pages")?;
//! ```

pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod index;
pub mod kv;
pub mod manager;
pub mod service;
pub mod types;

// Re-exports
pub use codec::{Codec, SCHEMA_VERSION};
pub use command::{
    BotContext, CommandArgs, CommandDescriptor, CommandHandler, CommandResponse, EphemeralPoster,
    Post, PostError, ResponseType,
};
pub use config::{Config, StorageConfig};
pub use error::{Result, StorageOp, SubscriptionError};
pub use index::{ChannelIndex, ReverseIndex};
pub use kv::{FileKvConfig, FileKvStore, KvStore, MemoryKvStore};
pub use manager::{ManagerOptions, SubscriptionManager, DRIFT_TARGET};
pub use service::SubscriptionService;
pub use types::*;
