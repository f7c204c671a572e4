// WAL Record Types
//
// On-disk layout, little endian:
//   Put:    [magic u32][kind u8][key_len u32][value_len u32][key][value]
//   Delete: [magic u32][kind u8][key_len u32][key]
use std::io::{self, Read};

/// "WAL\0"
pub const WAL_MAGIC: u32 = 0x57414C00;

/// magic + kind + key length
pub const RECORD_PREFIX_LEN: usize = 4 + 1 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Put = 1,
    Delete = 2,
}

impl RecordKind {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(RecordKind::Put),
            2 => Some(RecordKind::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// Result of decoding one record from a stream
#[derive(Debug)]
pub enum DecodeOutcome {
    Record(WalRecord, u64),
    /// Clean end of stream on a record boundary
    End,
    /// Short read, bad magic, unknown kind or implausible lengths
    Corrupt(&'static str),
}

impl WalRecord {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        WalRecord::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        WalRecord::Delete { key: key.into() }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            WalRecord::Put { .. } => RecordKind::Put,
            WalRecord::Delete { .. } => RecordKind::Delete,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            WalRecord::Put { key, .. } | WalRecord::Delete { key } => key,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            WalRecord::Put { key, value } => RECORD_PREFIX_LEN + 4 + key.len() + value.len(),
            WalRecord::Delete { key } => RECORD_PREFIX_LEN + key.len(),
        }
    }

    /// Append the encoded record to `buf`. Callers validate lengths against u32.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&WAL_MAGIC.to_le_bytes());
        buf.push(self.kind() as u8);
        match self {
            WalRecord::Put { key, value } => {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(key.as_bytes());
                buf.extend_from_slice(value);
            }
            WalRecord::Delete { key } => {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key.as_bytes());
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decode the next record. `remaining` bounds the lengths a record may
    /// claim so a garbage header cannot trigger a huge allocation.
    pub fn decode_from<R: Read>(reader: &mut R, remaining: u64) -> io::Result<DecodeOutcome> {
        let mut prefix = [0u8; RECORD_PREFIX_LEN];
        match read_full(reader, &mut prefix)? {
            0 => return Ok(DecodeOutcome::End),
            n if n < RECORD_PREFIX_LEN => return Ok(DecodeOutcome::Corrupt("truncated header")),
            _ => {}
        }

        let magic = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if magic != WAL_MAGIC {
            return Ok(DecodeOutcome::Corrupt("bad magic"));
        }
        let kind = match RecordKind::from_u8(prefix[4]) {
            Some(kind) => kind,
            None => return Ok(DecodeOutcome::Corrupt("unknown record kind")),
        };
        let key_len = u32::from_le_bytes([prefix[5], prefix[6], prefix[7], prefix[8]]) as u64;

        let mut consumed = RECORD_PREFIX_LEN as u64;
        let value_len = if kind == RecordKind::Put {
            let mut len_buf = [0u8; 4];
            if read_full(reader, &mut len_buf)? < 4 {
                return Ok(DecodeOutcome::Corrupt("truncated header"));
            }
            consumed += 4;
            u32::from_le_bytes(len_buf) as u64
        } else {
            0
        };

        if key_len == 0 {
            return Ok(DecodeOutcome::Corrupt("empty key"));
        }
        if consumed + key_len + value_len > remaining {
            return Ok(DecodeOutcome::Corrupt("truncated payload"));
        }

        let mut key = vec![0u8; key_len as usize];
        if read_full(reader, &mut key)? < key.len() {
            return Ok(DecodeOutcome::Corrupt("truncated payload"));
        }
        let key = match String::from_utf8(key) {
            Ok(key) => key,
            Err(_) => return Ok(DecodeOutcome::Corrupt("key is not utf-8")),
        };

        let record = match kind {
            RecordKind::Put => {
                let mut value = vec![0u8; value_len as usize];
                if read_full(reader, &mut value)? < value.len() {
                    return Ok(DecodeOutcome::Corrupt("truncated payload"));
                }
                WalRecord::Put { key, value }
            }
            RecordKind::Delete => WalRecord::Delete { key },
        };

        Ok(DecodeOutcome::Record(record, consumed + key_len + value_len))
    }
}

/// Like `read_exact`, but reports how many bytes were read before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
