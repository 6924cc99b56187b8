//! Journal Reader: Sequential replay of segments with corruption detection
//!
//! Features:
//! - Sequential entry reading across segment files
//! - CRC32C checksum validation on every read
//! - Torn-tail tolerance: an incomplete last entry of the newest segment (or
//!   a complete last entry failing its checksum) is what a crash mid-append
//!   leaves behind, so it is reported and skipped
//! - Anything else that fails to parse is corruption and stops the replay

use crate::journal::{list_segments, JournalEntry, JournalError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Checksum mismatch in {path} at byte offset {offset}: entry seq={sequence}")]
    ChecksumMismatch {
        path: PathBuf,
        offset: u64,
        sequence: u64,
    },

    #[error("Corruption detected in {path} at byte offset {offset}: {detail}")]
    Corruption {
        path: PathBuf,
        offset: u64,
        detail: String,
    },
}

// ── Corruption Log Entry ────────────────────────────────────────────

/// Structured record of a skipped torn tail.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptionRecord {
    pub path: PathBuf,
    /// Length of the valid prefix; the file should be truncated to it.
    pub valid_len: u64,
    pub kind: CorruptionKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorruptionKind {
    ChecksumMismatch,
    TruncatedEntry,
}

// ── Journal Reader ──────────────────────────────────────────────────

/// Sequential reader over every segment in a journal directory.
pub struct JournalReader {
    segments: Vec<PathBuf>,
    current: usize,
    data: Vec<u8>,
    pos: usize,
    last_sequence: Option<u64>,
    torn_tail: Option<CorruptionRecord>,
}

impl JournalReader {
    /// Open a reader over all segments in `dir`. A missing directory reads as empty.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        let segments = list_segments(dir)?
            .into_iter()
            .map(|(_, path)| path)
            .collect::<Vec<_>>();
        let mut reader = Self {
            segments,
            current: 0,
            data: Vec::new(),
            pos: 0,
            last_sequence: None,
            torn_tail: None,
        };
        reader.load_current()?;
        Ok(reader)
    }

    /// Read the next valid entry. Returns `None` once every segment is consumed.
    pub fn next_entry(&mut self) -> Result<Option<JournalEntry>, ReaderError> {
        loop {
            if self.pos >= self.data.len() {
                if !self.advance()? {
                    return Ok(None);
                }
                continue;
            }

            let offset = self.pos as u64;
            match JournalEntry::from_bytes(&self.data[self.pos..]) {
                Ok((entry, consumed)) => {
                    let at_tail = self.pos + consumed == self.data.len();
                    if !entry.verify_checksum() {
                        if at_tail && self.is_last_segment() {
                            self.record_torn_tail(
                                CorruptionKind::ChecksumMismatch,
                                format!("CRC32C mismatch for seq={}", entry.sequence),
                            );
                            continue;
                        }
                        return Err(ReaderError::ChecksumMismatch {
                            path: self.current_path(),
                            offset,
                            sequence: entry.sequence,
                        });
                    }

                    self.pos += consumed;
                    self.last_sequence = Some(entry.sequence);
                    return Ok(Some(entry));
                }
                Err(err) => {
                    // only a short read at the end of the newest segment is a torn append
                    let incomplete = matches!(err, JournalError::Incomplete { .. });
                    if incomplete && self.is_last_segment() {
                        self.record_torn_tail(CorruptionKind::TruncatedEntry, err.to_string());
                        continue;
                    }
                    return Err(ReaderError::Corruption {
                        path: self.current_path(),
                        offset,
                        detail: err.to_string(),
                    });
                }
            }
        }
    }

    /// Read all valid entries into a Vec.
    pub fn read_all(&mut self) -> Result<Vec<JournalEntry>, ReaderError> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// The torn tail skipped in the newest segment, if any.
    pub fn torn_tail(&self) -> Option<&CorruptionRecord> {
        self.torn_tail.as_ref()
    }

    // ── Internal Helpers ────────────────────────────────────────────

    fn record_torn_tail(&mut self, kind: CorruptionKind, detail: String) {
        let remaining = self.data.len() - self.pos;
        self.torn_tail = Some(CorruptionRecord {
            path: self.current_path(),
            valid_len: self.pos as u64,
            kind,
            detail: format!("{detail} ({remaining} trailing bytes)"),
        });
        self.pos = self.data.len();
    }

    fn is_last_segment(&self) -> bool {
        self.current + 1 >= self.segments.len()
    }

    fn current_path(&self) -> PathBuf {
        self.segments
            .get(self.current)
            .cloned()
            .unwrap_or_default()
    }

    fn load_current(&mut self) -> Result<(), ReaderError> {
        self.data.clear();
        self.pos = 0;
        if let Some(path) = self.segments.get(self.current) {
            self.data = fs::read(path)?;
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<bool, ReaderError> {
        if self.current + 1 >= self.segments.len() {
            return Ok(false);
        }
        self.current += 1;
        self.load_current()?;
        Ok(true)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{segment_path, JournalConfig, JournalWriter, Op};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_entries(dir: &Path, count: usize) -> JournalWriter {
        let mut writer = JournalWriter::open(JournalConfig::new(dir)).unwrap();
        for i in 0..count {
            writer.append(Op::Put, vec![i as u8; 8]).unwrap();
        }
        writer
    }

    #[test]
    fn test_missing_dir_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let mut reader = JournalReader::open(&tmp.path().join("absent")).unwrap();
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_read_all_in_order() {
        let tmp = TempDir::new().unwrap();
        drop(write_entries(tmp.path(), 5));

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        let entries = reader.read_all().unwrap();
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
        assert_eq!(reader.last_sequence(), Some(5));
        assert!(reader.torn_tail().is_none());
    }

    #[test]
    fn test_reads_across_segments() {
        let tmp = TempDir::new().unwrap();
        let mut writer = write_entries(tmp.path(), 2);
        writer.rotate().unwrap();
        writer.append(Op::Delete, vec![9]).unwrap();
        drop(writer);

        let entries = JournalReader::open(tmp.path()).unwrap().read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].op, Op::Delete);
    }

    #[test]
    fn test_torn_tail_is_skipped() {
        let tmp = TempDir::new().unwrap();
        drop(write_entries(tmp.path(), 3));
        let path = segment_path(tmp.path(), 0);
        let valid_len = fs::metadata(&path).unwrap().len();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[40, 0, 0, 0, 1, 2]).unwrap();
        drop(file);

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        assert_eq!(reader.read_all().unwrap().len(), 3);
        let tail = reader.torn_tail().unwrap();
        assert_eq!(tail.kind, CorruptionKind::TruncatedEntry);
        assert_eq!(tail.valid_len, valid_len);
    }

    #[test]
    fn test_corruption_before_tail_is_an_error() {
        let tmp = TempDir::new().unwrap();
        drop(write_entries(tmp.path(), 3));
        let path = segment_path(tmp.path(), 0);

        let mut data = fs::read(&path).unwrap();
        // flip a payload byte of the first entry
        data[18] ^= 0xff;
        fs::write(&path, data).unwrap();

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        assert!(matches!(
            reader.read_all(),
            Err(ReaderError::ChecksumMismatch { sequence: 1, .. })
        ));
    }

    #[test]
    fn test_corrupt_older_segment_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut writer = write_entries(tmp.path(), 1);
        writer.rotate().unwrap();
        writer.append(Op::Put, vec![1]).unwrap();
        drop(writer);

        let path = segment_path(tmp.path(), 0);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[1, 2]).unwrap();
        drop(file);

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        assert!(matches!(
            reader.read_all(),
            Err(ReaderError::Corruption { .. })
        ));
    }

    #[test]
    fn test_bad_length_in_newest_segment_is_an_error() {
        let tmp = TempDir::new().unwrap();
        drop(write_entries(tmp.path(), 3));
        let path = segment_path(tmp.path(), 0);

        let mut data = fs::read(&path).unwrap();
        // high byte of the first entry's length prefix
        data[3] = 0xff;
        fs::write(&path, data).unwrap();

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        assert!(matches!(
            reader.read_all(),
            Err(ReaderError::Corruption { offset: 0, .. })
        ));
        assert!(reader.torn_tail().is_none());
    }

    #[test]
    fn test_unknown_op_in_newest_segment_is_an_error() {
        let tmp = TempDir::new().unwrap();
        drop(write_entries(tmp.path(), 2));
        let path = segment_path(tmp.path(), 0);

        let mut data = fs::read(&path).unwrap();
        data[12] = 9;
        fs::write(&path, data).unwrap();

        let mut reader = JournalReader::open(tmp.path()).unwrap();
        assert!(matches!(
            reader.read_all(),
            Err(ReaderError::Corruption { .. })
        ));
    }
}
