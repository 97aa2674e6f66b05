//! In-memory KV store.
//!
//! Besides serving as a process-local backend, it counts calls and can be
//! told to fail reads or writes, which is how the index's failure paths are
//! exercised.

use super::KvStore;
use crate::error::{Result, SubscriptionError};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Injected failures.
#[derive(Debug, Default)]
struct Faults {
    fail_reads: HashSet<String>,
    fail_writes: HashSet<String>,
    /// Fail every write once this many more writes have succeeded.
    fail_writes_after: Option<u64>,
}

/// Thread-safe in-memory KV store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    reads: AtomicU64,
    writes: AtomicU64,
    faults: Mutex<Faults>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with pre-populated entries.
    pub fn with_entries(entries: HashMap<String, Vec<u8>>) -> Self {
        Self {
            entries: RwLock::new(entries),
            ..Default::default()
        }
    }

    /// Copy of every stored entry.
    pub fn snapshot(&self) -> HashMap<String, Vec<u8>> {
        self.entries.read().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Number of `get` calls, including failed ones.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `set` calls, including failed ones.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Make every `get` of `key` fail.
    pub fn fail_reads_for(&self, key: impl Into<String>) {
        self.faults.lock().fail_reads.insert(key.into());
    }

    /// Make every `set` of `key` fail.
    pub fn fail_writes_for(&self, key: impl Into<String>) {
        self.faults.lock().fail_writes.insert(key.into());
    }

    /// Let `n` more writes succeed, then fail all writes.
    pub fn fail_writes_after(&self, n: u64) {
        self.faults.lock().fail_writes_after = Some(n);
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if self.faults.lock().fail_reads.contains(key) {
            return Err(SubscriptionError::read_failed(key, "injected read failure"));
        }

        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        {
            let mut faults = self.faults.lock();
            if faults.fail_writes.contains(key) {
                return Err(SubscriptionError::write_failed(key, "injected write failure"));
            }
            if let Some(remaining) = faults.fail_writes_after.as_mut() {
                if *remaining == 0 {
                    return Err(SubscriptionError::write_failed(key, "injected write failure"));
                }
                *remaining -= 1;
            }
        }

        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
