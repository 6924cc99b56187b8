//! Journal Writer: Append-only log of order table mutations with checksums
//!
//! The order table is persisted as a redo log: every mutation appends either
//! the full new row (`Put`) or the key of a removed row (`Delete`). Segments
//! rotate by size; compaction starts a fresh segment holding only live rows.
//!
//! # Binary Format (per entry)
//! ```text
//! [total_len: u32]
//! [sequence:  u64]
//! [op:        u8]   // 1 = Put, 2 = Delete
//! [payload_len: u32][payload: bytes]
//! [checksum: u32]  // CRC32C over sequence+op+payload
//! ```

use crc32c::crc32c;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, warn};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown operation code: {0}")]
    UnknownOp(u8),

    /// The data ends inside an entry; what a crash mid-append leaves behind.
    #[error("Incomplete entry: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("Journal writer failed to roll back a write; reopen the store")]
    WriterFailed,
}

// ── Journal Entry ───────────────────────────────────────────────────

/// Kind of table mutation carried by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Payload is an encoded row; replaces any row with the same key.
    Put,
    /// Payload is the row key.
    Delete,
}

impl Op {
    fn code(self) -> u8 {
        match self {
            Op::Put => 1,
            Op::Delete => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self, JournalError> {
        match code {
            1 => Ok(Op::Put),
            2 => Ok(Op::Delete),
            other => Err(JournalError::UnknownOp(other)),
        }
    }
}

/// A single journaled table mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Monotonic sequence number across segments
    pub sequence: u64,
    pub op: Op,
    pub payload: Vec<u8>,
    /// CRC32C checksum over (sequence ++ op ++ payload)
    pub checksum: u32,
}

/// Fixed bytes in a body besides the payload: seq + op + payload_len + crc.
const BODY_OVERHEAD: usize = 8 + 1 + 4 + 4;

/// Bodies larger than this are treated as corruption.
const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

impl JournalEntry {
    /// Create a new entry, computing the CRC32C checksum automatically.
    pub fn new(sequence: u64, op: Op, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(sequence, op, &payload);
        Self {
            sequence,
            op,
            payload,
            checksum,
        }
    }

    pub fn compute_checksum(sequence: u64, op: Op, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(8 + 1 + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.push(op.code());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.sequence, self.op, &self.payload)
    }

    /// Serialize entry to the binary wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = (BODY_OVERHEAD + self.payload.len()) as u32;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.push(self.op.code());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Deserialize entry from the binary wire format.
    ///
    /// Returns `(entry, bytes_consumed)` on success. The checksum is parsed
    /// but not verified here.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        if data.len() < 4 {
            return Err(JournalError::Incomplete {
                needed: 4,
                available: data.len(),
            });
        }

        let body_len = u32::from_le_bytes(read_array(data, 0)) as usize;
        if body_len > MAX_BODY_LEN {
            return Err(JournalError::Serialization(format!(
                "Implausible body length: {body_len} (likely corruption)"
            )));
        }
        if body_len < BODY_OVERHEAD {
            return Err(JournalError::Serialization(format!(
                "Body too small: {body_len} bytes, minimum is {BODY_OVERHEAD}"
            )));
        }

        let total = 4 + body_len;
        if data.len() < total {
            return Err(JournalError::Incomplete {
                needed: total,
                available: data.len(),
            });
        }

        let body = &data[4..total];
        let sequence = u64::from_le_bytes(read_array(body, 0));
        let op = Op::from_code(body[8])?;
        let payload_len = u32::from_le_bytes(read_array(body, 9)) as usize;

        if payload_len != body_len - BODY_OVERHEAD {
            return Err(JournalError::Serialization(format!(
                "payload_len {payload_len} disagrees with body length {body_len}"
            )));
        }
        let payload = body[13..13 + payload_len].to_vec();
        let checksum = u32::from_le_bytes(read_array(body, 13 + payload_len));

        Ok((
            Self {
                sequence,
                op,
                payload,
                checksum,
            },
            total,
        ))
    }
}

/// Copy `N` bytes at `offset`; callers have checked the bounds.
fn read_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

// ── Flush / Fsync Policies ──────────────────────────────────────────

/// Controls when buffered data is flushed to OS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushPolicy {
    EveryWrite,
    EveryN(usize),
}

/// Controls when `fsync` (durable write) is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    EveryWrite,
    EveryN(usize),
    /// Fsync only on rotation, compaction and explicit `sync`.
    OnRotation,
}

// ── Journal Writer Configuration ────────────────────────────────────

/// Configuration for the order table journal.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory for segment files.
    pub dir: PathBuf,
    /// Maximum segment size in bytes before rotation (default 64 MiB).
    pub max_file_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    /// Durable defaults: every mutation is flushed and fsynced before returning.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Append-only segment writer with checksums, rotation, and fsync control.
pub struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_file_size: u64,
    next_sequence: u64,
    writes_since_flush: usize,
    writes_since_fsync: usize,
    file_index: u64,
    /// Set when a failed write could not be rolled back.
    failed: bool,
}

impl JournalWriter {
    /// Open the latest segment for appending, creating the directory if needed.
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;

        let file_index = latest_segment_index(&config.dir)?.unwrap_or(0);
        let current_file = segment_path(&config.dir, file_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_file)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file,
            current_file_size,
            next_sequence: 1,
            writes_since_flush: 0,
            writes_since_fsync: 0,
            file_index,
            failed: false,
        })
    }

    /// Set the next sequence number (after replaying existing segments).
    pub fn set_next_sequence(&mut self, seq: u64) {
        self.next_sequence = seq;
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn current_file_path(&self) -> &Path {
        &self.current_file
    }

    pub fn current_index(&self) -> u64 {
        self.file_index
    }

    /// Append one mutation and apply the flush/fsync policies.
    ///
    /// On error nothing of the entry remains in the segment and the sequence
    /// number is not consumed.
    pub fn append(&mut self, op: Op, payload: Vec<u8>) -> Result<JournalEntry, JournalError> {
        self.prepare_append()?;
        let entry = JournalEntry::new(self.next_sequence, op, payload);
        self.commit(&entry.to_bytes(), 1)?;
        Ok(entry)
    }

    /// Append several mutations as one write; the flush/fsync policies run
    /// once for the whole batch. Either every entry is kept or none is.
    ///
    /// Rotation is only considered before the batch, so a batch may carry a
    /// segment past `max_file_size`.
    pub fn append_batch(
        &mut self,
        items: impl IntoIterator<Item = (Op, Vec<u8>)>,
    ) -> Result<Vec<JournalEntry>, JournalError> {
        self.prepare_append()?;
        let entries: Vec<JournalEntry> = items
            .into_iter()
            .zip(self.next_sequence..)
            .map(|((op, payload), sequence)| JournalEntry::new(sequence, op, payload))
            .collect();
        if entries.is_empty() {
            return Ok(entries);
        }

        let mut bytes = Vec::new();
        for entry in &entries {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        self.commit(&bytes, entries.len())?;
        Ok(entries)
    }

    /// Force flush + fsync.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        if self.failed {
            return Err(JournalError::WriterFailed);
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_flush = 0;
        self.writes_since_fsync = 0;
        Ok(())
    }

    /// Close the current segment and continue in a new one.
    ///
    /// Returns the index of the new segment.
    pub fn rotate(&mut self) -> Result<u64, JournalError> {
        self.sync()?;

        self.file_index += 1;
        self.current_file = segment_path(&self.config.dir, self.file_index);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_file)?;

        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        Ok(self.file_index)
    }

    /// Delete every segment older than `index`. Returns how many were removed.
    pub fn remove_segments_before(&mut self, index: u64) -> Result<usize, JournalError> {
        let mut removed = 0;
        for (segment, path) in list_segments(&self.config.dir)? {
            if segment < index {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ── Internal Helpers ────────────────────────────────────────────

    fn prepare_append(&mut self) -> Result<(), JournalError> {
        if self.failed {
            return Err(JournalError::WriterFailed);
        }
        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }
        Ok(())
    }

    /// Write `count` encoded entries; on failure cut them back out.
    fn commit(&mut self, bytes: &[u8], count: usize) -> Result<(), JournalError> {
        let start = self.current_file_size;
        let fsync_backlog = self.writes_since_fsync;

        if let Err(err) = self.write_through(bytes, count) {
            self.writes_since_fsync = fsync_backlog;
            match self.rollback(start) {
                Ok(()) => warn!(
                    path = %self.current_file.display(),
                    offset = start,
                    error = %err,
                    "Journal append failed; entry rolled back"
                ),
                Err(rollback_err) => {
                    error!(
                        path = %self.current_file.display(),
                        offset = start,
                        error = %err,
                        rollback_error = %rollback_err,
                        "Journal append failed and could not be rolled back"
                    );
                    self.failed = true;
                }
            }
            return Err(err);
        }

        self.next_sequence += count as u64;
        Ok(())
    }

    fn write_through(&mut self, bytes: &[u8], count: usize) -> Result<(), JournalError> {
        self.writer.write_all(bytes)?;
        self.current_file_size += bytes.len() as u64;
        self.writes_since_flush += count;
        self.writes_since_fsync += count;

        self.apply_flush_policy()?;
        self.apply_fsync_policy()
    }

    /// Cut the segment back to `offset`, the end of the last good entry.
    ///
    /// `BufWriter` keeps unwritten bytes after a failed flush and would write
    /// them on the next flush or on drop, so the buffer is taken apart
    /// instead. Earlier entries still buffered under a lazy flush policy are
    /// written out; everything past `offset` is discarded.
    fn rollback(&mut self, offset: u64) -> Result<(), JournalError> {
        let file = self.writer.get_ref().try_clone()?;
        let broken = std::mem::replace(&mut self.writer, BufWriter::new(file));
        let (old_file, pending) = broken.into_parts();
        let pending = pending.unwrap_or_else(|panicked| panicked.into_inner());

        let on_disk = old_file.metadata()?.len();
        if on_disk > offset {
            old_file.set_len(offset)?;
        } else {
            let keep = ((offset - on_disk) as usize).min(pending.len());
            if keep > 0 {
                self.writer.write_all(&pending[..keep])?;
                self.writer.flush()?;
            }
        }

        self.current_file_size = offset;
        self.writes_since_flush = 0;
        Ok(())
    }

    fn apply_flush_policy(&mut self) -> Result<(), JournalError> {
        let should_flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.writes_since_flush >= n,
        };
        if should_flush {
            self.writer.flush()?;
            self.writes_since_flush = 0;
        }
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), JournalError> {
        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if should_fsync {
            // flush first so fsync covers the buffered bytes
            self.writer.flush()?;
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }
}

// ── Segment files ───────────────────────────────────────────────────

const SEGMENT_PREFIX: &str = "orders-";
const SEGMENT_SUFFIX: &str = ".log";

pub(crate) fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("{SEGMENT_PREFIX}{index:06}{SEGMENT_SUFFIX}"))
}

/// All segment files in `dir`, sorted by index.
pub(crate) fn list_segments(dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut segments: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let index = name
                .strip_prefix(SEGMENT_PREFIX)?
                .strip_suffix(SEGMENT_SUFFIX)?
                .parse::<u64>()
                .ok()?;
            Some((index, e.path()))
        })
        .collect();

    segments.sort_by_key(|(index, _)| *index);
    Ok(segments)
}

fn latest_segment_index(dir: &Path) -> io::Result<Option<u64>> {
    Ok(list_segments(dir)?.last().map(|(index, _)| *index))
}

// ── Tests ───────────────────────────────────────────────────────────
