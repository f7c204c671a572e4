//! Storage engine: one index and one write-ahead log behind a single lock
//!
//! Mutations are appended to the log and fsynced before they touch the index,
//! all under the exclusive side of one `RwLock`, so other callers never see an
//! index state the log could not reproduce. Reads take the shared side and
//! never touch the log.
//!
//! Two engines over the same data directory are a caller error; nothing here
//! coordinates between processes.

use crate::config::EngineConfig;
use crate::durability::{snapshot, sync_parent_dir};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::transaction::{IsolationLevel, Transaction, TransactionId};
use crate::wal::{apply_record, RecoveryManager, RecoveryReport, WalManager, WalRecord};
use parking_lot::RwLock;
use serde::Serialize;
use std::fs;
use tracing::{debug, info, warn};

/// Point-in-time engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub num_keys: usize,
    /// Key plus value bytes across the index
    pub total_size: usize,
    pub wal_size: u64,
    pub snapshot_size: u64,
    /// Transactions started over this engine's lifetime
    pub num_transactions: u64,
}

struct EngineState {
    index: Index,
    wal: Option<WalManager>,
    next_txn_id: u64,
    last_recovery: Option<RecoveryReport>,
}

impl EngineState {
    fn open_parts(&mut self) -> Result<(&mut Index, &mut WalManager)> {
        match self.wal.as_mut() {
            Some(wal) => Ok((&mut self.index, wal)),
            None => Err(closed()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.wal.is_none() {
            return Err(closed());
        }
        Ok(())
    }
}

fn closed() -> Error {
    Error::InvalidState("engine is not open".to_string())
}

pub struct Engine {
    config: EngineConfig,
    state: RwLock<EngineState>,
}

impl Engine {
    /// Create a closed engine. Nothing touches the disk until `open`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let index = Index::with_capacity(config.initial_capacity);
        Ok(Engine {
            config,
            state: RwLock::new(EngineState {
                index,
                wal: None,
                next_txn_id: 1,
                last_recovery: None,
            }),
        })
    }

    /// Create and open an engine in one step
    pub fn open_with(config: EngineConfig) -> Result<Self> {
        let engine = Self::new(config)?;
        engine.open()?;
        Ok(engine)
    }

    /// Open the log, creating it if absent, and rebuild the index from the
    /// checkpoint snapshot plus the log.
    pub fn open(&self) -> Result<RecoveryReport> {
        let mut state = self.state.write();
        if state.wal.is_some() {
            return Err(Error::InvalidState("engine is already open".to_string()));
        }

        if !self.config.data_dir.try_exists()? {
            fs::create_dir_all(&self.config.data_dir)?;
            sync_parent_dir(&self.config.data_dir)?;
        }
        let mut wal = WalManager::open(self.config.wal_path())?;

        let snapshot_path = self.config.snapshot_path();
        let mut index = Index::with_capacity(self.config.initial_capacity);
        let report = RecoveryManager::new(&wal, &snapshot_path).recover(&mut index)?;

        if let Some(reason) = &report.replay.corruption {
            warn!(
                path = ?wal.path(),
                reason = %reason,
                valid_len = report.replay.valid_len,
                discarded = report.replay.discarded_bytes(),
                "dropping invalid log tail"
            );
            wal.truncate_to(report.replay.valid_len)?;
        }

        info!(
            data_dir = ?self.config.data_dir,
            keys = index.len(),
            snapshot_entries = ?report.snapshot_entries,
            replayed = report.replay.records,
            "engine opened"
        );

        state.index = index;
        state.wal = Some(wal);
        state.last_recovery = Some(report.clone());
        Ok(report)
    }

    /// Checkpoint if configured, then release the log. If the checkpoint
    /// fails the engine stays open.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        state.ensure_open()?;

        if self.config.checkpoint_on_close {
            self.checkpoint_locked(&mut state)?;
        }

        state.wal = None;
        state.index.clear();
        info!(data_dir = ?self.config.data_dir, "engine closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.read().wal.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Recovery report from the most recent `open`
    pub fn last_recovery(&self) -> Option<RecoveryReport> {
        self.state.read().last_recovery.clone()
    }

    pub(crate) fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("key must not be empty".to_string()));
        }
        if key.len() > self.config.max_key_len {
            return Err(Error::InvalidArgument(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                self.config.max_key_len
            )));
        }
        Ok(())
    }

    pub(crate) fn validate_value(&self, value: &[u8]) -> Result<()> {
        if value.is_empty() {
            return Err(Error::InvalidArgument("value must not be empty".to_string()));
        }
        if value.len() > self.config.max_value_len {
            return Err(Error::InvalidArgument(format!(
                "value is {} bytes, limit is {}",
                value.len(),
                self.config.max_value_len
            )));
        }
        Ok(())
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.validate_key(key)?;
        self.validate_value(value)?;

        let mut state = self.state.write();
        let (index, wal) = state.open_parts()?;

        wal.append(&WalRecord::put(key, value))?;
        index.put(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.validate_key(key)?;

        let state = self.state.read();
        state.ensure_open()?;
        state.index.get(key)
    }

    /// Remove `key`. A missing key is reported without writing to the log.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.validate_key(key)?;

        let mut state = self.state.write();
        let (index, wal) = state.open_parts()?;
        if !index.contains(key) {
            return Err(Error::KeyNotFound(key.to_string()));
        }

        wal.append(&WalRecord::delete(key))?;
        index.delete(key)
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        self.validate_key(key)?;

        let state = self.state.read();
        state.ensure_open()?;
        Ok(state.index.contains(key))
    }

    /// Snapshot of the current keys, in no particular order
    pub fn keys(&self) -> Result<Vec<String>> {
        let state = self.state.read();
        state.ensure_open()?;
        Ok(state.index.iter().map(|(key, _)| key.to_string()).collect())
    }

    /// Start a transaction. The isolation level is recorded, not enforced.
    pub fn begin_transaction(&self, isolation_level: IsolationLevel) -> Result<Transaction<'_>> {
        let id = {
            let mut state = self.state.write();
            state.ensure_open()?;
            let id = TransactionId(state.next_txn_id);
            state.next_txn_id += 1;
            id
        };

        debug!(txn = %id, isolation = ?isolation_level, "transaction started");
        Ok(Transaction::new(self, id, isolation_level))
    }

    /// Log every record with one durable write, then apply them. Deletes of
    /// keys already gone are dropped before logging. Returns how many
    /// records were applied.
    pub(crate) fn commit_overlay(&self, txn: TransactionId, records: Vec<WalRecord>) -> Result<usize> {
        let mut state = self.state.write();
        let (index, wal) = state.open_parts()?;

        let records: Vec<WalRecord> = records
            .into_iter()
            .filter(|record| match record {
                WalRecord::Delete { key } => index.contains(key),
                WalRecord::Put { .. } => true,
            })
            .collect();

        wal.append_batch(&records)?;
        for record in &records {
            apply_record(index, record);
        }

        debug!(txn = %txn, records = records.len(), "overlay applied");
        Ok(records.len())
    }

    /// Write the whole index to the snapshot file, then truncate the log.
    pub fn checkpoint(&self) -> Result<()> {
        let mut state = self.state.write();
        state.ensure_open()?;
        self.checkpoint_locked(&mut state)
    }

    fn checkpoint_locked(&self, state: &mut EngineState) -> Result<()> {
        let (index, wal) = state.open_parts()?;
        let wal_size = wal.size();

        // The snapshot must be durable before the log is cut
        let snapshot_size = snapshot::write_snapshot(&self.config.snapshot_path(), index)?;
        wal.truncate()?;

        info!(
            keys = index.len(),
            snapshot_size,
            truncated = wal_size,
            "checkpoint complete"
        );
        Ok(())
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let state = self.state.read();
        let (index, wal) = match state.wal.as_ref() {
            Some(wal) => (&state.index, wal),
            None => return Err(closed()),
        };

        let snapshot_size = match fs::metadata(self.config.snapshot_path()) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(EngineStats {
            num_keys: index.len(),
            total_size: index.total_bytes(),
            wal_size: wal.size(),
            snapshot_size,
            num_transactions: state.next_txn_id - 1,
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                warn!(data_dir = ?self.config.data_dir, error = %e, "failed to close engine on drop");
            }
        }
    }
}
