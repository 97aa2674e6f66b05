//! Key-value storage adapters.
//!
//! The index only relies on single-key atomicity:
//! - `get` returns the last value written for a key, or `None`
//! - `set` replaces the value for a key as a whole
//!
//! There are no multi-key transactions and no compare-and-set, so a
//! read-modify-write of one key can lose a concurrent update of the same key.

mod file;
mod memory;

pub use file::{FileKvConfig, FileKvStore};
pub use memory::MemoryKvStore;

use crate::error::Result;
use std::sync::Arc;

/// Byte-oriented KV store with single-key atomicity.
pub trait KvStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }
}
