// WAL Recovery System
use super::entry::*;
use super::manager::WalManager;
use crate::durability::snapshot;
use crate::error::Result;
use crate::index::Index;
use serde::Serialize;
use std::path::Path;

/// Outcome of replaying one log file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub records: usize,
    pub puts: usize,
    pub deletes: usize,
    /// Length of the valid prefix in bytes
    pub valid_len: u64,
    pub file_len: u64,
    /// Why replay stopped early, if it did
    pub corruption: Option<String>,
}

impl ReplayStats {
    pub fn has_torn_tail(&self) -> bool {
        self.corruption.is_some()
    }

    pub fn discarded_bytes(&self) -> u64 {
        self.file_len - self.valid_len
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Entries loaded from the checkpoint snapshot, if one existed
    pub snapshot_entries: Option<usize>,
    pub replay: ReplayStats,
}

/// Apply one record to `index`. Deleting an absent key is a no-op, which keeps
/// replay idempotent on top of a snapshot that already contains its effects.
pub fn apply_record(index: &mut Index, record: &WalRecord) {
    match record {
        WalRecord::Put { key, value } => index.put(key, value),
        WalRecord::Delete { key } => {
            let _ = index.delete(key);
        }
    }
}

/// Rebuilds an index from the checkpoint snapshot followed by the log.
pub struct RecoveryManager<'a> {
    wal: &'a WalManager,
    snapshot_path: &'a Path,
}

impl<'a> RecoveryManager<'a> {
    pub fn new(wal: &'a WalManager, snapshot_path: &'a Path) -> Self {
        RecoveryManager { wal, snapshot_path }
    }

    pub fn recover(&self, index: &mut Index) -> Result<RecoveryReport> {
        let snapshot_entries = snapshot::load_snapshot(self.snapshot_path, index)?;

        let replay = self.wal.replay(|record| {
            apply_record(index, &record);
            Ok(())
        })?;

        Ok(RecoveryReport {
            snapshot_entries,
            replay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_recover_log_only() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal = WalManager::open(temp_dir.path().join("wal.log")).unwrap();
        wal.append(&WalRecord::put("a", b"1".to_vec())).unwrap();
        wal.append(&WalRecord::put("b", b"2".to_vec())).unwrap();
        wal.append(&WalRecord::delete("a")).unwrap();

        let snapshot_path = temp_dir.path().join("snapshot.bin");
        let mut index = Index::new();
        let report = RecoveryManager::new(&wal, &snapshot_path)
            .recover(&mut index)
            .unwrap();

        assert_eq!(report.snapshot_entries, None);
        assert_eq!(report.replay.records, 3);
        assert!(!index.contains("a"));
        assert_eq!(index.get("b").unwrap(), b"2");
    }

    #[test]
    fn test_recover_snapshot_then_log() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot_path = temp_dir.path().join("snapshot.bin");

        let mut base = Index::new();
        base.put("a", b"1");
        base.put("b", b"2");
        snapshot::write_snapshot(&snapshot_path, &base).unwrap();

        // Log still holds records already folded into the snapshot
        let mut wal = WalManager::open(temp_dir.path().join("wal.log")).unwrap();
        wal.append(&WalRecord::put("a", b"1".to_vec())).unwrap();
        wal.append(&WalRecord::delete("b")).unwrap();
        wal.append(&WalRecord::delete("b")).unwrap();
        wal.append(&WalRecord::put("c", b"3".to_vec())).unwrap();

        let mut index = Index::new();
        let report = RecoveryManager::new(&wal, &snapshot_path)
            .recover(&mut index)
            .unwrap();

        assert_eq!(report.snapshot_entries, Some(2));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("a").unwrap(), b"1");
        assert_eq!(index.get("c").unwrap(), b"3");
    }
}
