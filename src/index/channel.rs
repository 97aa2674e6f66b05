//! Channel index: subscriptions owned by one channel.

use crate::codec::Codec;
use crate::error::Result;
use crate::kv::KvStore;
use crate::types::ChannelSubscriptions;
use tracing::debug;

/// Reads and writes channel index entries, keyed by channel id.
#[derive(Clone, Copy)]
pub struct ChannelIndex<'a> {
    store: &'a dyn KvStore,
    codec: Codec,
}

impl<'a> ChannelIndex<'a> {
    pub fn new(store: &'a dyn KvStore, codec: Codec) -> Self {
        Self { store, codec }
    }

    /// Load a channel's subscriptions. A channel never written to has none.
    pub fn load(&self, channel_id: &str) -> Result<ChannelSubscriptions> {
        let Some(bytes) = self.store.get(channel_id)? else {
            debug!(channel_id, "channel index entry absent");
            return Ok(ChannelSubscriptions::new());
        };

        let mut subscriptions: ChannelSubscriptions = Codec::decode(&bytes)?;
        subscriptions.backfill(channel_id);
        Ok(subscriptions)
    }

    /// Replace a channel's entry as a whole.
    pub fn save(&self, channel_id: &str, subscriptions: &ChannelSubscriptions) -> Result<()> {
        let bytes = self.codec.encode(subscriptions)?;
        self.store.set(channel_id, &bytes)?;
        debug!(channel_id, count = subscriptions.len(), "channel index entry written");
        Ok(())
    }
}
