//! Checksums of the encryption configuration of shoot API servers.
//!
//! The API server has to be rolled when its encryption configuration
//! changes. The last applied checksum per shoot is kept in a
//! [`ChecksumCache`] owned by the caller, so repeated reconciliations can
//! compare against it without reading the rendered secret again.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use sha2::{Digest, Sha256};

/// Last known checksum per shoot, keyed by `namespace/name`.
///
/// The lock is only held for the map operation itself.
#[derive(Debug, Default)]
pub struct ChecksumCache {
    entries: RwLock<BTreeMap<String, String>>,
}

impl ChecksumCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store a checksum, returning whether it differs from the previous one.
    pub fn set(&self, key: &str, checksum: impl Into<String>) -> bool {
        let checksum = checksum.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let changed = entries.get(key) != Some(&checksum);
        entries.insert(key.to_string(), checksum);
        changed
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Copy of all entries
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Hex encoded sha256 over the sorted key/value pairs of `data`.
///
/// Keys and values are separated so that moving bytes between a key and
/// its value changes the checksum.
pub fn encryption_config_checksum(data: &BTreeMap<String, Vec<u8>>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in data {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    format!("{:x}", hasher.finalize())
}
