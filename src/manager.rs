//! Subscription manager keeping the channel and reverse indexes consistent.
//!
//! The store only offers single-key atomicity, so every mutation is a short
//! sequence of whole-entry writes. They are ordered so that a failure part
//! way through leaves a channel record the reverse index no longer points at
//! (inert: the space simply stops notifying the channel) rather than a reverse
//! entry pointing at a channel without a matching record (which would cause
//! notifications nobody asked for):
//!
//! - reverse writes that shrink a channel's reach happen before the channel write
//! - reverse writes that grow it happen after
//!
//! When the second write fails the caller gets
//! [`SubscriptionError::PartialConsistency`] and an `error` event is logged on
//! the `index_drift` target. [`SubscriptionManager::check_channel`] and
//! [`SubscriptionManager::repair_channel`] detect and fix such drift.

use crate::codec::Codec;
use crate::error::{Result, SubscriptionError};
use crate::index::{ChannelIndex, KeyLocks, ReverseIndex, DEFAULT_STRIPES};
use crate::kv::KvStore;
use crate::types::{IndexDrift, ReverseKey, SpaceSubscribers, Subscription};
use parking_lot::MutexGuard;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Tracing target for partial-write drift between the two indexes.
pub const DRIFT_TARGET: &str = "index_drift";

/// Manager options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Encoding for new writes. Reads accept either encoding.
    pub codec: Codec,

    /// Serialise operations touching the same key within this process.
    /// Default: false (last writer wins, as the store contract implies).
    pub serialize_same_key: bool,

    /// Number of lock stripes per key family when serialising.
    pub lock_stripes: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            serialize_same_key: false,
            lock_stripes: DEFAULT_STRIPES,
        }
    }
}

/// Creates, lists, edits and deletes subscriptions across both indexes.
pub struct SubscriptionManager {
    store: Arc<dyn KvStore>,
    codec: Codec,
    locks: Option<KeyLocks>,
}

impl SubscriptionManager {
    /// Create a manager with default options.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_options(store, &ManagerOptions::default())
    }

    pub fn with_options(store: Arc<dyn KvStore>, options: &ManagerOptions) -> Self {
        Self {
            store,
            codec: options.codec,
            locks: options
                .serialize_same_key
                .then(|| KeyLocks::new(options.lock_stripes)),
        }
    }

    fn channels(&self) -> ChannelIndex<'_> {
        ChannelIndex::new(self.store.as_ref(), self.codec)
    }

    fn reverse(&self) -> ReverseIndex<'_> {
        ReverseIndex::new(self.store.as_ref(), self.codec)
    }

    fn lock_channel(&self, channel_id: &str) -> Option<MutexGuard<'_, ()>> {
        self.locks.as_ref().map(|locks| locks.channel(channel_id))
    }

    fn lock_spaces<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k ReverseKey>,
    ) -> Vec<MutexGuard<'_, ()>> {
        match &self.locks {
            Some(locks) => locks.spaces(keys),
            None => Vec::new(),
        }
    }

    // --- Queries ---

    /// All subscriptions of a channel, ordered by alias.
    ///
    /// A channel without subscriptions yields an empty list.
    pub fn list_subscriptions(&self, channel_id: &str) -> Result<Vec<Subscription>> {
        Ok(self.channels().load(channel_id)?.into_vec())
    }

    pub fn get_subscription(&self, channel_id: &str, alias: &str) -> Result<Option<Subscription>> {
        Ok(self.channels().load(channel_id)?.remove(alias))
    }

    /// Channels subscribed to a space, with the events each wants.
    pub fn subscribers(&self, base_url: &str, space_key: &str) -> Result<SpaceSubscribers> {
        let key = ReverseKey::derive(base_url, space_key)?;
        self.reverse().load(&key)
    }

    /// Channels to notify about `event` in a space.
    pub fn channels_for_event(
        &self,
        base_url: &str,
        space_key: &str,
        event: &str,
    ) -> Result<Vec<String>> {
        Ok(self.subscribers(base_url, space_key)?.channels_for_event(event))
    }

    // --- Mutations ---

    /// Add a subscription to its channel.
    ///
    /// Fails with [`SubscriptionError::AliasExists`] when the channel already
    /// uses the alias; nothing is written in that case.
    pub fn create_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        let subscription = subscription.normalized()?;
        let key = subscription.reverse_key()?;
        let channel_id = subscription.channel_id.clone();
        let alias = subscription.alias.clone();

        let _channel_guard = self.lock_channel(&channel_id);
        let mut channel = self.channels().load(&channel_id)?;
        if channel.contains(&alias) {
            return Err(SubscriptionError::AliasExists { channel_id, alias });
        }

        let _space_guards = self.lock_spaces([&key]);
        let mut subscribers = self.reverse().load(&key)?;

        channel.insert(subscription.clone());
        let reverse_changed = subscribers.sync_channel(&channel_id, channel.events_for(&key));

        // Growing: channel first.
        self.channels().save(&channel_id, &channel)?;
        if reverse_changed {
            self.reverse()
                .save(&key, &subscribers)
                .map_err(|e| drift(&channel_id, &alias, &key, e))?;
        }

        info!(channel_id = %channel_id, alias = %alias, key = %key, "subscription created");
        Ok(subscription)
    }

    /// Replace an existing subscription, keeping its alias.
    ///
    /// The target space and events may both change.
    pub fn edit_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        let subscription = subscription.normalized()?;
        let new_key = subscription.reverse_key()?;
        let channel_id = subscription.channel_id.clone();
        let alias = subscription.alias.clone();

        let _channel_guard = self.lock_channel(&channel_id);
        let mut channel = self.channels().load(&channel_id)?;
        let previous = channel
            .get(&alias)
            .cloned()
            .ok_or_else(|| SubscriptionError::NotFound {
                channel_id: channel_id.clone(),
                alias: alias.clone(),
            })?;
        let old_key = previous.reverse_key()?;

        let _space_guards = self.lock_spaces([&old_key, &new_key]);
        channel.insert(subscription.clone());

        if old_key == new_key {
            let mut subscribers = self.reverse().load(&new_key)?;
            let before: Vec<String> = subscribers
                .get(&channel_id)
                .map(<[String]>::to_vec)
                .unwrap_or_default();
            let desired = channel.events_for(&new_key).unwrap_or_default();
            let shrinks = before.iter().any(|e| !desired.contains(e));
            let reverse_changed = subscribers.sync_channel(&channel_id, Some(desired));

            if !reverse_changed {
                self.channels().save(&channel_id, &channel)?;
            } else if shrinks {
                self.reverse().save(&new_key, &subscribers)?;
                self.channels()
                    .save(&channel_id, &channel)
                    .map_err(|e| drift(&channel_id, &alias, &new_key, e))?;
            } else {
                self.channels().save(&channel_id, &channel)?;
                self.reverse()
                    .save(&new_key, &subscribers)
                    .map_err(|e| drift(&channel_id, &alias, &new_key, e))?;
            }
        } else {
            let mut old_subscribers = self.reverse().load(&old_key)?;
            let mut new_subscribers = self.reverse().load(&new_key)?;
            let old_changed =
                old_subscribers.sync_channel(&channel_id, channel.events_for(&old_key));
            let new_changed =
                new_subscribers.sync_channel(&channel_id, channel.events_for(&new_key));

            if old_changed {
                self.reverse().save(&old_key, &old_subscribers)?;
            }
            self.channels()
                .save(&channel_id, &channel)
                .map_err(|e| {
                    if old_changed {
                        drift(&channel_id, &alias, &old_key, e)
                    } else {
                        e
                    }
                })?;
            if new_changed {
                self.reverse()
                    .save(&new_key, &new_subscribers)
                    .map_err(|e| drift(&channel_id, &alias, &new_key, e))?;
            }
        }

        info!(
            channel_id = %channel_id,
            alias = %alias,
            moved = old_key != new_key,
            "subscription edited"
        );
        Ok(subscription)
    }

    /// Remove a subscription from both indexes, returning the removed record.
    ///
    /// At most four storage calls: read channel, read reverse, write reverse,
    /// write channel. A missing alias returns [`SubscriptionError::NotFound`]
    /// after the first read, with nothing written.
    pub fn delete_subscription(&self, channel_id: &str, alias: &str) -> Result<Subscription> {
        let _channel_guard = self.lock_channel(channel_id);
        let mut channel = self.channels().load(channel_id)?;
        let Some(removed) = channel.remove(alias) else {
            debug!(channel_id, alias, "delete of unknown alias");
            return Err(SubscriptionError::NotFound {
                channel_id: channel_id.to_string(),
                alias: alias.to_string(),
            });
        };
        let key = removed.reverse_key()?;

        let _space_guards = self.lock_spaces([&key]);
        let mut subscribers = self.reverse().load(&key)?;

        // Another alias of this channel may still target the same space.
        subscribers.sync_channel(channel_id, channel.events_for(&key));

        // Shrinking: reverse first.
        self.reverse().save(&key, &subscribers)?;
        self.channels()
            .save(channel_id, &channel)
            .map_err(|e| drift(channel_id, alias, &key, e))?;

        info!(channel_id, alias, key = %key, "subscription deleted");
        Ok(removed)
    }

    // --- Drift ---

    /// Compare a channel's records against the reverse entries they target.
    ///
    /// The channel index is the source of truth. Read-only. Reverse entries
    /// that list the channel without any matching record cannot be found from
    /// here, since the store cannot enumerate keys.
    pub fn check_channel(&self, channel_id: &str) -> Result<Vec<IndexDrift>> {
        let channel = self.channels().load(channel_id)?;
        let mut drifts = Vec::new();

        for (key, first) in channel.targets() {
            let subscribers = self.reverse().load(&key)?;
            let expected = channel.events_for(&key).unwrap_or_default();
            match subscribers.get(channel_id) {
                None => drifts.push(IndexDrift::MissingChannel {
                    reverse_key: key,
                    base_url: first.base_url.clone(),
                    space_key: first.space_key.clone(),
                }),
                Some(found) if found != expected.as_slice() => {
                    drifts.push(IndexDrift::EventMismatch {
                        reverse_key: key,
                        expected,
                        found: found.to_vec(),
                    })
                }
                Some(_) => {}
            }
        }

        Ok(drifts)
    }

    /// Rewrite the reverse entries a channel's records target so they match
    /// the channel index. Returns the number of entries rewritten.
    pub fn repair_channel(&self, channel_id: &str) -> Result<usize> {
        let _channel_guard = self.lock_channel(channel_id);
        let channel = self.channels().load(channel_id)?;
        let targets = channel.targets();
        let _space_guards = self.lock_spaces(targets.keys());

        let mut repaired = 0;
        for key in targets.keys() {
            let mut subscribers = self.reverse().load(key)?;
            if subscribers.sync_channel(channel_id, channel.events_for(key)) {
                self.reverse().save(key, &subscribers)?;
                warn!(target: DRIFT_TARGET, channel_id, key = %key, "reverse index entry repaired");
                repaired += 1;
            }
        }

        Ok(repaired)
    }
}

fn drift(
    channel_id: &str,
    alias: &str,
    key: &ReverseKey,
    source: SubscriptionError,
) -> SubscriptionError {
    error!(
        target: DRIFT_TARGET,
        channel_id,
        alias,
        reverse_key = %key,
        error = %source,
        "channel and reverse index disagree after partial write"
    );
    SubscriptionError::PartialConsistency {
        channel_id: channel_id.to_string(),
        alias: alias.to_string(),
        reverse_key: key.to_string(),
        source: Box::new(source),
    }
}
