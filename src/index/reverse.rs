//! Reverse index: channels subscribed to one wiki space.

use crate::codec::Codec;
use crate::error::Result;
use crate::kv::KvStore;
use crate::types::{ReverseKey, SpaceSubscribers};
use tracing::debug;

/// Reads and writes reverse index entries, keyed by [`ReverseKey`].
#[derive(Clone, Copy)]
pub struct ReverseIndex<'a> {
    store: &'a dyn KvStore,
    codec: Codec,
}

impl<'a> ReverseIndex<'a> {
    pub fn new(store: &'a dyn KvStore, codec: Codec) -> Self {
        Self { store, codec }
    }

    /// Load the subscribers of a space. A space never written to has none.
    pub fn load(&self, key: &ReverseKey) -> Result<SpaceSubscribers> {
        match self.store.get(key.as_str())? {
            Some(bytes) => Codec::decode(&bytes),
            None => Ok(SpaceSubscribers::new()),
        }
    }

    /// Replace a space's entry as a whole.
    ///
    /// An entry with no channels left is still written, as an empty map; the
    /// store has no delete.
    pub fn save(&self, key: &ReverseKey, subscribers: &SpaceSubscribers) -> Result<()> {
        let bytes = self.codec.encode(subscribers)?;
        self.store.set(key.as_str(), &bytes)?;
        debug!(key = %key, channels = subscribers.len(), "reverse index entry written");
        Ok(())
    }
}
