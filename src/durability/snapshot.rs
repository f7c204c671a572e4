//! Checkpoint snapshots
//!
//! A snapshot is the full index written as
//! `[magic "WALKVSNP"][u64 entry count][Put records][u64 xxh3 of everything before]`.
//! It is written to a sibling `.tmp` file, fsynced and renamed into place, so a
//! reader only ever sees a complete snapshot or the previous one.

use super::fsync::{sync_dir, sync_file};
use crate::error::Result;
use crate::index::Index;
use crate::wal::{DecodeOutcome, WalRecord};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

pub const SNAPSHOT_MAGIC: &[u8; 8] = b"WALKVSNP";

const HEADER_LEN: usize = 8 + 8;
const CHECKSUM_LEN: usize = 8;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Hashes everything written through it.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Xxh3,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Durably replace the snapshot at `path` with the contents of `index`.
/// Returns the snapshot size in bytes.
pub fn write_snapshot(path: &Path, index: &Index) -> Result<u64> {
    let tmp = temp_path(path);
    let file = File::create(&tmp)?;

    let mut writer = HashingWriter {
        inner: BufWriter::new(file),
        hasher: Xxh3::new(),
    };
    writer.write_all(SNAPSHOT_MAGIC)?;
    writer.write_all(&(index.len() as u64).to_le_bytes())?;

    let mut buf = Vec::new();
    for (key, value) in index.iter() {
        buf.clear();
        WalRecord::put(key, value).encode_into(&mut buf);
        writer.write_all(&buf)?;
    }

    let checksum = writer.hasher.digest();
    let mut inner = writer.inner;
    inner.write_all(&checksum.to_le_bytes())?;
    inner.flush()?;

    let file = inner.into_inner().map_err(|e| e.into_error())?;
    sync_file(&file)?;
    let size = file.metadata()?.len();
    drop(file);

    fs::rename(&tmp, path)?;
    if let Some(dir) = path.parent() {
        sync_dir(dir)?;
    }

    debug!(path = ?path, entries = index.len(), bytes = size, "snapshot written");
    Ok(size)
}

/// Load the snapshot at `path` into `index`.
///
/// Returns `None` when no snapshot exists. A snapshot that fails validation is
/// an `InvalidData` I/O error: unlike the log it is never partially written.
pub fn load_snapshot(path: &Path, index: &mut Index) -> Result<Option<usize>> {
    let tmp = temp_path(path);
    if tmp.exists() {
        debug!(path = ?tmp, "removing leftover snapshot temp file");
        fs::remove_file(&tmp)?;
    }

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if data.len() < HEADER_LEN + CHECKSUM_LEN || &data[..8] != SNAPSHOT_MAGIC {
        return Err(invalid(format!("{:?} is not a snapshot file", path)).into());
    }

    let body_end = data.len() - CHECKSUM_LEN;
    let mut checksum = [0u8; CHECKSUM_LEN];
    checksum.copy_from_slice(&data[body_end..]);
    if xxh3_64(&data[..body_end]) != u64::from_le_bytes(checksum) {
        return Err(invalid(format!("snapshot {:?} failed checksum", path)).into());
    }

    let mut count = [0u8; 8];
    count.copy_from_slice(&data[8..HEADER_LEN]);
    let count = u64::from_le_bytes(count) as usize;

    let body = &data[HEADER_LEN..body_end];
    let mut cursor = Cursor::new(body);
    let mut remaining = body.len() as u64;
    let mut loaded = 0;
    loop {
        match WalRecord::decode_from(&mut cursor, remaining)? {
            DecodeOutcome::Record(WalRecord::Put { key, value }, len) => {
                index.put(&key, &value);
                remaining -= len;
                loaded += 1;
            }
            DecodeOutcome::Record(WalRecord::Delete { key }, _) => {
                return Err(invalid(format!("snapshot holds a delete for {:?}", key)).into());
            }
            DecodeOutcome::End => break,
            DecodeOutcome::Corrupt(reason) => {
                return Err(invalid(format!("snapshot {:?}: {}", path, reason)).into());
            }
        }
    }

    if loaded != count {
        return Err(invalid(format!(
            "snapshot {:?} declares {} entries but holds {}",
            path, count, loaded
        ))
        .into());
    }

    Ok(Some(loaded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    fn sample_index() -> Index {
        let mut index = Index::new();
        index.put("alpha", b"1");
        index.put("beta", &[0u8, 255, 7]);
        index
    }

    #[test]
    fn test_write_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.bin");
        let index = sample_index();

        let size = write_snapshot(&path, &index).unwrap();
        assert_eq!(size, fs::metadata(&path).unwrap().len());
        assert!(!temp_path(&path).exists());

        let mut loaded = Index::new();
        assert_eq!(load_snapshot(&path, &mut loaded).unwrap(), Some(2));
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_missing_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = Index::new();
        let result = load_snapshot(&temp_dir.path().join("none.bin"), &mut index).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_corrupt_snapshot_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.bin");
        write_snapshot(&path, &sample_index()).unwrap();

        let mut data = fs::read(&path).unwrap();
        data[HEADER_LEN + 2] ^= 0x40;
        fs::write(&path, &data).unwrap();

        let mut index = Index::new();
        match load_snapshot(&path, &mut index) {
            Err(Error::IoError(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            other => panic!("expected InvalidData, got {:?}", other),
        }
    }

    #[test]
    fn test_leftover_temp_removed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.bin");
        fs::write(temp_path(&path), b"half written").unwrap();

        let mut index = Index::new();
        assert_eq!(load_snapshot(&path, &mut index).unwrap(), None);
        assert!(!temp_path(&path).exists());
    }
}
