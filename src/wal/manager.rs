// WAL Manager - Write-Ahead Logging
use super::entry::*;
use super::recovery::ReplayStats;
use crate::durability::{sync_data, sync_file, sync_parent_dir};
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Append-only log over a single file.
///
/// Every successful `append` has been written and fsynced before it returns.
/// The manager has no lock of its own: the engine serializes access to it
/// together with the index.
pub struct WalManager {
    path: PathBuf,
    file: File,
    size: u64,
    poisoned: bool,
}

impl WalManager {
    /// Open the log at `path`, creating it if absent. A newly created log has
    /// its directory entry fsynced before this returns.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = path.try_exists()?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        if !existed {
            sync_file(&file)?;
            sync_parent_dir(&path)?;
        }

        let size = file.metadata()?.len();

        Ok(WalManager {
            path,
            file,
            size,
            poisoned: false,
        })
    }

    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        self.write_durable(&record.encode())
    }

    /// Append `records` with a single write and a single fsync.
    pub fn append_batch(&mut self, records: &[WalRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let total = records.iter().map(WalRecord::encoded_len).sum();
        let mut buf = Vec::with_capacity(total);
        for record in records {
            record.encode_into(&mut buf);
        }

        self.write_durable(&buf)
    }

    /// Write and fsync `buf`. On failure the file is cut back to its previous
    /// length; if that fails too the log is poisoned and every later append
    /// fails with `IoError` until `truncate_to` resets it.
    fn write_durable(&mut self, buf: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(Error::IoError(io::Error::new(
                ErrorKind::Other,
                format!("log {:?} has an unrecoverable partial write", self.path),
            )));
        }

        let start = self.size;
        let result = self
            .file
            .write_all(buf)
            .and_then(|_| self.file.flush())
            .and_then(|_| sync_data(&self.file));

        match result {
            Ok(()) => {
                self.size += buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                // A torn record must not sit in front of later appends
                if let Err(rollback) = self.file.set_len(start).and_then(|_| sync_file(&self.file)) {
                    error!(path = ?self.path, error = %rollback, "failed to roll back partial log write");
                    self.poisoned = true;
                } else {
                    warn!(path = ?self.path, error = %e, "log append failed, rolled back");
                }
                Err(Error::IoError(e))
            }
        }
    }

    /// Read the log from the start and hand each valid record to `visitor`.
    ///
    /// Replay stops at the first torn or corrupt record; everything before it
    /// is the valid prefix. Only genuine read errors and visitor errors fail.
    pub fn replay<F>(&self, mut visitor: F) -> Result<ReplayStats>
    where
        F: FnMut(WalRecord) -> Result<()>,
    {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut stats = ReplayStats {
            file_len,
            ..ReplayStats::default()
        };

        loop {
            let remaining = file_len - stats.valid_len;
            match WalRecord::decode_from(&mut reader, remaining)? {
                DecodeOutcome::Record(record, len) => {
                    match record.kind() {
                        RecordKind::Put => stats.puts += 1,
                        RecordKind::Delete => stats.deletes += 1,
                    }
                    stats.records += 1;
                    stats.valid_len += len;
                    visitor(record)?;
                }
                DecodeOutcome::End => break,
                DecodeOutcome::Corrupt(reason) => {
                    stats.corruption = Some(reason.to_string());
                    break;
                }
            }
        }

        Ok(stats)
    }

    /// Reset the log to zero length.
    pub fn truncate(&mut self) -> Result<()> {
        self.truncate_to(0)
    }

    /// Cut the log back to `len` bytes, discarding everything after it.
    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        sync_file(&self.file)?;
        self.size = len;
        self.poisoned = false;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// A manager whose file handle cannot be written, so every append fails.
    #[cfg(test)]
    pub(crate) fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(WalManager {
            path,
            file,
            size,
            poisoned: false,
        })
    }
}
