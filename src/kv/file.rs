//! File-backed KV store.
//!
//! One file per key, sharded by the first byte of the key's SHA-256:
//!
//! ```text
//! <path>/MANIFEST          magic + format version
//! <path>/LOCK              exclusive process lock
//! <path>/<shard>/<digest>  one entry
//! ```
//!
//! Entry layout: magic, version, key length (u32) + key, value length (u64) +
//! value, CRC32 of the value. Writes go to a temporary file that is renamed
//! over the entry, so a reader sees either the old or the new value.

use super::KvStore;
use crate::error::{Result, SubscriptionError};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"WKV\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Magic bytes for entry files.
const ENTRY_MAGIC: &[u8; 4] = b"KVE\0";

/// Current entry format version.
const ENTRY_VERSION: u8 = 1;

/// Magic, version and key length.
const ENTRY_HEADER_LEN: u64 = 9;

/// Distinguishes temporary files of concurrent writers.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FileKvConfig {
    /// Base directory of the store.
    pub path: PathBuf,

    /// Read cache size (number of entries).
    pub cache_size: usize,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for FileKvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./subscriptions"),
            cache_size: 1000,
            create_if_missing: true,
        }
    }
}

/// KV store persisting each key in its own file.
pub struct FileKvStore {
    path: PathBuf,

    /// Held for the lifetime of the store.
    _lock_file: File,

    cache: Mutex<LruCache<String, Vec<u8>>>,

    /// Keeps disk and cache updates of concurrent writers in the same order.
    write_lock: Mutex<()>,
}

impl FileKvStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: FileKvConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(SubscriptionError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: FileKvConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        debug!(path = %config.path.display(), "created file kv store");
        Ok(Self::with_lock(config, lock_file))
    }

    /// Open an existing store.
    pub fn open(config: FileKvConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        debug!(path = %config.path.display(), "opened file kv store");
        Ok(Self::with_lock(config, lock_file))
    }

    fn with_lock(config: FileKvConfig, lock_file: File) -> Self {
        let cache_size = NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            path: config.path,
            _lock_file: lock_file,
            cache: Mutex::new(LruCache::new(cache_size)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop cached values so the next reads hit disk.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest: [u8; 32] = Sha256::digest(key.as_bytes()).into();
        self.path
            .join(hex::encode(&digest[0..1]))
            .join(hex::encode(digest))
    }

    fn read_entry(path: &Path, key: &str) -> Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != ENTRY_MAGIC {
            return Err(SubscriptionError::InvalidFormat("Invalid entry magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != ENTRY_VERSION {
            return Err(SubscriptionError::InvalidFormat(format!(
                "Unsupported entry version: {}",
                version[0]
            )));
        }

        let mut key_len_bytes = [0u8; 4];
        file.read_exact(&mut key_len_bytes)?;
        let key_len = u32::from_le_bytes(key_len_bytes) as u64;
        // magic + version + key length + key + value length + value + crc
        let key_end = ENTRY_HEADER_LEN + key_len;
        if key_end + 12 > file_len {
            return Err(SubscriptionError::InvalidFormat(format!(
                "Entry file for {key} has a key length past its end"
            )));
        }
        let mut stored_key = vec![0u8; key_len as usize];
        file.read_exact(&mut stored_key)?;
        if stored_key != key.as_bytes() {
            return Err(SubscriptionError::InvalidFormat(format!(
                "Entry file for {key} holds a different key"
            )));
        }

        let mut value_len_bytes = [0u8; 8];
        file.read_exact(&mut value_len_bytes)?;
        let value_len = u64::from_le_bytes(value_len_bytes);
        if value_len != file_len - key_end - 12 {
            return Err(SubscriptionError::InvalidFormat(format!(
                "Entry file for {key} has a value length of {value_len} in {file_len} bytes"
            )));
        }
        let mut value = vec![0u8; value_len as usize];
        file.read_exact(&mut value)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&value);
        if stored_checksum != computed_checksum {
            return Err(SubscriptionError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(value)
    }

    fn write_entry(path: &Path, key: &str, value: &[u8]) -> Result<()> {
        let shard_dir = path
            .parent()
            .ok_or_else(|| SubscriptionError::InvalidFormat("Entry path has no shard".into()))?;
        fs::create_dir_all(shard_dir)?;

        let tmp_path = path.with_extension(format!(
            "tmp{}-{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let written = Self::write_tmp(&tmp_path, key, value)
            .and_then(|()| fs::rename(&tmp_path, path).map_err(Into::into));
        if written.is_err() {
            if let Err(err) = fs::remove_file(&tmp_path) {
                debug!(path = %tmp_path.display(), error = %err, "temporary entry not removed");
            }
        }

        written
    }

    fn write_tmp(tmp_path: &Path, key: &str, value: &[u8]) -> Result<()> {
        let mut file = File::create(tmp_path)?;

        file.write_all(ENTRY_MAGIC)?;
        file.write_all(&[ENTRY_VERSION])?;

        let key_bytes = key.as_bytes();
        file.write_all(&(key_bytes.len() as u32).to_le_bytes())?;
        file.write_all(key_bytes)?;

        file.write_all(&(value.len() as u64).to_le_bytes())?;
        file.write_all(value)?;

        file.write_all(&crc32fast::hash(value).to_le_bytes())?;
        file.sync_all()?;

        Ok(())
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(SubscriptionError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(SubscriptionError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file.try_lock_exclusive().map_err(|_| {
            warn!(path = %path.display(), "file kv store is locked by another process");
            SubscriptionError::Locked
        })?;

        Ok(lock_file)
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().get(key).cloned() {
            return Ok(Some(cached));
        }

        // A cold read must not cache a value older than a concurrent write.
        let _lock = self.write_lock.lock();
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let value = Self::read_entry(&path, key)?;
        self.cache.lock().put(key.to_string(), value.clone());
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.entry_path(key);
        let _lock = self.write_lock.lock();

        // Keep the cache from serving a value the disk never accepted.
        self.cache.lock().pop(key);
        Self::write_entry(&path, key, value)?;
        self.cache.lock().put(key.to_string(), value.to_vec());

        Ok(())
    }
}
