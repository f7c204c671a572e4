// Buffered Transaction over an Engine
use super::types::*;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::wal::WalRecord;
use ahash::AHashMap;
use std::time::Instant;
use tracing::debug;

/// A short-lived unit of buffered writes.
///
/// Writes go to a private overlay and reach the engine only on `commit`, which
/// logs them durably and applies them under the engine's exclusive lock.
/// Mutating methods take `&mut self`, so a transaction is driven by one thread
/// at a time. Dropping an active transaction rolls it back.
pub struct Transaction<'e> {
    engine: &'e Engine,
    id: TransactionId,
    isolation_level: IsolationLevel,
    state: TransactionState,
    overlay: AHashMap<String, OverlayEntry>,
    start_time: Instant,
}

impl<'e> Transaction<'e> {
    pub(crate) fn new(engine: &'e Engine, id: TransactionId, isolation_level: IsolationLevel) -> Self {
        Transaction {
            engine,
            id,
            isolation_level,
            state: TransactionState::Active,
            overlay: AHashMap::new(),
            start_time: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    pub fn is_committed(&self) -> bool {
        self.state == TransactionState::Committed
    }

    /// Number of keys with a pending write or delete
    pub fn pending_writes(&self) -> usize {
        self.overlay.len()
    }

    fn ensure_active(&self, op: &str) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::InvalidState(format!(
                "Cannot {} {} in state {:?}",
                op, self.id, self.state
            )));
        }
        Ok(())
    }

    pub fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_active("write to")?;
        self.engine.validate_key(key)?;
        self.engine.validate_value(value)?;

        self.overlay
            .insert(key.to_string(), OverlayEntry::Put(value.to_vec()));
        Ok(())
    }

    /// Own pending writes first, then the engine's committed state.
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.ensure_active("read from")?;
        self.engine.validate_key(key)?;

        match self.overlay.get(key) {
            Some(OverlayEntry::Put(value)) => Ok(value.clone()),
            Some(OverlayEntry::Tombstone) => Err(Error::KeyNotFound(key.to_string())),
            None => self.engine.get(key),
        }
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_active("read from")?;
        self.engine.validate_key(key)?;

        match self.overlay.get(key) {
            Some(OverlayEntry::Put(_)) => Ok(true),
            Some(OverlayEntry::Tombstone) => Ok(false),
            None => self.engine.exists(key),
        }
    }

    /// Buffer a delete. Fails with `KeyNotFound` if the key is not visible here.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.ensure_active("write to")?;
        if !self.exists(key)? {
            return Err(Error::KeyNotFound(key.to_string()));
        }

        self.overlay.insert(key.to_string(), OverlayEntry::Tombstone);
        Ok(())
    }

    /// Log and apply every pending write atomically with respect to other
    /// engine callers. On error the transaction stays active and nothing
    /// was applied.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active("commit")?;

        let records: Vec<WalRecord> = self
            .overlay
            .iter()
            .map(|(key, entry)| match entry {
                OverlayEntry::Put(value) => WalRecord::put(key.as_str(), value.as_slice()),
                OverlayEntry::Tombstone => WalRecord::delete(key.as_str()),
            })
            .collect();

        let applied = self.engine.commit_overlay(self.id, records)?;

        self.overlay.clear();
        self.state = TransactionState::Committed;
        debug!(
            txn = %self.id,
            isolation = ?self.isolation_level,
            applied,
            elapsed_us = self.start_time.elapsed().as_micros() as u64,
            "transaction committed"
        );
        Ok(())
    }

    /// Discard every pending write. The engine is untouched.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active("roll back")?;

        let discarded = self.overlay.len();
        self.overlay.clear();
        self.state = TransactionState::RolledBack;
        debug!(txn = %self.id, discarded, "transaction rolled back");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            debug!(txn = %self.id, discarded = self.overlay.len(), "implicit rollback on drop");
            self.overlay.clear();
            self.state = TransactionState::RolledBack;
        }
    }
}
