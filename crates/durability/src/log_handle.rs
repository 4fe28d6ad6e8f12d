//! The `LogHandle` collaborator: an append-only, length-prefixed,
//! CRC-checked byte log that hands back a strictly increasing [`Lsn`] per
//! append.
//!
//! The transaction manager treats the WAL as an opaque ordered byte log;
//! this module is the one concrete realization of that contract, using
//! segmented-WAL framing (`[len][payload][crc32]`) but deliberately
//! without segment rotation, compaction, or a manifest — those belong to
//! a partition-storage layer built on top of this one.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use dirtx_core::{Lsn, TxnResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, error};

/// Appends opaque records to a durable log and returns their position.
///
/// Implementations must guarantee that concurrent callers observe a
/// strictly increasing sequence of LSNs; callers are not
/// required to externally serialize appends, though in practice
/// `TxnManager` always does via `writeTxnsLock`.
pub trait LogHandle: Send + Sync {
    /// Append `record` to the log.
    ///
    /// When `sync` is `true`, the write is durable on disk before this
    /// call returns.
    fn append(&self, record: &[u8], sync: bool) -> TxnResult<Lsn>;
}

/// A single growing file, framed as `[len: u32][payload][crc32: u32]`
/// (all little-endian). The returned [`Lsn`] is the byte offset of the
/// frame's length prefix, which only ever grows.
pub struct FileLogHandle {
    inner: Mutex<FileLogInner>,
}

struct FileLogInner {
    file: File,
    next_offset: u64,
}

impl FileLogHandle {
    /// Open (creating if needed) a log file at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let next_offset = file.seek(SeekFrom::End(0))?;
        debug!(path = %path.display(), next_offset, "opened WAL file");
        Ok(FileLogHandle {
            inner: Mutex::new(FileLogInner { file, next_offset }),
        })
    }

    /// Iterate the records currently on disk, oldest first.
    ///
    /// Not used by the transaction manager itself — this exists so a
    /// future recovery component has something to replay.
    pub fn iter_records(path: impl AsRef<Path>) -> io::Result<LogRecordIter> {
        let file = File::open(path)?;
        Ok(LogRecordIter {
            reader: BufReader::new(file),
            offset: 0,
        })
    }
}

impl LogHandle for FileLogHandle {
    fn append(&self, record: &[u8], sync: bool) -> TxnResult<Lsn> {
        let mut inner = self.inner.lock();
        let lsn = Lsn::new(inner.next_offset as i64);

        let mut hasher = Hasher::new();
        hasher.update(record);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(4 + record.len() + 4);
        frame.write_u32::<LittleEndian>(record.len() as u32)?;
        frame.extend_from_slice(record);
        frame.write_u32::<LittleEndian>(crc)?;

        if let Err(e) = inner.file.write_all(&frame) {
            error!(lsn = %lsn, error = %e, "WAL append failed");
            return Err(e.into());
        }
        if sync {
            if let Err(e) = inner.file.sync_data() {
                error!(lsn = %lsn, error = %e, "WAL sync failed");
                return Err(e.into());
            }
        }
        inner.next_offset += frame.len() as u64;

        Ok(lsn)
    }
}

/// Forward iterator over records read back from a [`FileLogHandle`]'s
/// backing file.
pub struct LogRecordIter {
    reader: BufReader<File>,
    offset: u64,
}

impl Iterator for LogRecordIter {
    type Item = io::Result<(Lsn, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let start_offset = self.offset;
        let len = match self.reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return None,
            Err(e) => return Some(Err(e)),
        };

        let mut payload = vec![0u8; len as usize];
        if let Err(e) = self.reader.read_exact(&mut payload) {
            return Some(Err(e));
        }

        let stored_crc = match self.reader.read_u32::<LittleEndian>() {
            Ok(crc) => crc,
            Err(e) => return Some(Err(e)),
        };

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        if hasher.finalize() != stored_crc {
            return Some(Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "log record CRC mismatch",
            )));
        }

        self.offset += 4 + len as u64 + 4;
        Some(Ok((Lsn::new(start_offset as i64), payload)))
    }
}

/// In-memory [`LogHandle`] for tests: `Lsn` is the index of the record
/// in an in-process `Vec`.
#[derive(Default)]
pub struct InMemoryLogHandle {
    records: Mutex<Vec<Vec<u8>>>,
}

impl InMemoryLogHandle {
    /// Create an empty in-memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// `true` if no records have been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogHandle for InMemoryLogHandle {
    fn append(&self, record: &[u8], _sync: bool) -> TxnResult<Lsn> {
        let mut records = self.records.lock();
        let lsn = Lsn::new(records.len() as i64 + 1); // keep UNKNOWN_LSN (0) free
        records.push(record.to_vec());
        Ok(lsn)
    }
}
