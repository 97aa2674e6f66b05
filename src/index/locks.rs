//! Striped in-process locks for serialising same-key read-modify-writes.
//!
//! Lock order: at most one channel stripe, then every needed space stripe at
//! once in ascending stripe order. Nothing waits for a channel stripe while
//! holding a space stripe.

use crate::types::ReverseKey;
use parking_lot::{Mutex, MutexGuard};

/// Default number of stripes per key family.
pub const DEFAULT_STRIPES: usize = 64;

/// Striped mutexes for channel keys and reverse index keys.
pub struct KeyLocks {
    channels: Vec<Mutex<()>>,
    spaces: Vec<Mutex<()>>,
}

impl KeyLocks {
    pub fn new(stripes: usize) -> Self {
        let stripes = stripes.max(1);
        Self {
            channels: (0..stripes).map(|_| Mutex::new(())).collect(),
            spaces: (0..stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, key: &str) -> usize {
        crc32fast::hash(key.as_bytes()) as usize % self.channels.len()
    }

    /// Lock the stripe owning `channel_id`.
    pub fn channel(&self, channel_id: &str) -> MutexGuard<'_, ()> {
        self.channels[self.stripe(channel_id)].lock()
    }

    /// Lock the stripes owning every key in `keys`.
    pub fn spaces<'k>(&self, keys: impl IntoIterator<Item = &'k ReverseKey>) -> Vec<MutexGuard<'_, ()>> {
        let mut stripes: Vec<usize> = keys.into_iter().map(|k| self.stripe(k.as_str())).collect();
        stripes.sort_unstable();
        stripes.dedup();
        stripes.into_iter().map(|i| self.spaces[i].lock()).collect()
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
