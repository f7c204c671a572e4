//! In-memory key index
//!
//! The index is the single source of truth for reads. It carries no locking
//! of its own; the engine guards it together with the log.

use crate::error::{Error, Result};
use ahash::AHashMap;

#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: AHashMap<String, Vec<u8>>,
    total_bytes: usize,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: AHashMap::with_capacity(capacity),
            total_bytes: 0,
        }
    }

    /// Insert or overwrite `key`
    pub fn put(&mut self, key: &str, value: &[u8]) {
        match self.entries.get_mut(key) {
            Some(existing) => {
                self.total_bytes = self.total_bytes - existing.len() + value.len();
                existing.clear();
                existing.extend_from_slice(value);
            }
            None => {
                self.total_bytes += key.len() + value.len();
                self.entries.insert(key.to_string(), value.to_vec());
            }
        }
    }

    /// Copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    pub fn delete(&mut self, key: &str) -> Result<()> {
        match self.entries.remove(key) {
            Some(value) => {
                self.total_bytes -= key.len() + value.len();
                Ok(())
            }
            None => Err(Error::KeyNotFound(key.to_string())),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of key and value bytes across all entries
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Iteration order is unspecified
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.entries.get(k) == Some(v))
    }
}

impl Eq for Index {}
