//! The in-memory key store: an insertion-ordered map from fingerprint to
//! loaded private key.

use indexmap::IndexMap;

use crate::keys::{Fingerprint, LoadedKey};

/// Ordered `Fingerprint -> LoadedKey` map.
///
/// Not internally synchronized; callers share one `KeyStore` behind a
/// `parking_lot::Mutex` (see `crate::server::SharedState`). `IndexMap` is
/// used specifically because re-inserting an existing key updates its
/// value without moving it to the back -- exactly the "replace in place"
/// semantics `insert` needs.
#[derive(Default)]
pub struct KeyStore {
    keys: IndexMap<Fingerprint, LoadedKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        KeyStore {
            keys: IndexMap::new(),
        }
    }

    /// Insert `key`, replacing any existing entry at the same fingerprint
    /// without changing its position in iteration order.
    pub fn insert(&mut self, key: LoadedKey) {
        self.keys.insert(key.fingerprint(), key);
    }

    pub fn remove(&mut self, fingerprint: &Fingerprint) -> bool {
        self.keys.shift_remove(fingerprint).is_some()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&LoadedKey> {
        self.keys.get(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedKey> {
        self.keys.values()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
