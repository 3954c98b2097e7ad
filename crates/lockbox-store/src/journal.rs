use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entry::StoredEntry;
use crate::error::{StoreError, StoreResult};

/// A single mutation of a persistent partition.
///
/// On-disk framing of each record:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    /// An entry was created or overwritten.
    Put(StoredEntry),
    /// An entry was deleted (explicitly or by eviction).
    Remove { key: String },
}

/// Flush strategy for journal appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every record (safest, highest latency).
    EveryWrite,
    /// Flush to the OS and rely on its page cache.
    #[default]
    OsDefault,
}

/// Configuration for partition journals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
    /// Compact once the journal holds this many more records than there
    /// are live entries (default: 1024).
    pub compaction_slack: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            compaction_slack: 1024,
        }
    }
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

struct JournalWriter {
    file: File,
    /// End of the last complete record.
    offset: u64,
    /// Records written since the last rewrite (including recovered ones).
    records: u64,
    /// Set when a failed append could not be rolled back. Appends are
    /// refused until the journal is truncated or rewritten.
    damaged: bool,
}

/// Append-only, crash-recoverable mutation log of one partition.
///
/// Records are framed with a length prefix and CRC32. Recovery reads the file
/// front to back: records failing the CRC check are skipped, and a torn tail
/// ends recovery.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    config: JournalConfig,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path, config: JournalConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                file,
                offset,
                records: 0,
                damaged: false,
            }),
            config,
        })
    }

    /// Append one record. Returns the byte offset it was written at.
    ///
    /// The frame goes to the file in one write. If the write or sync fails,
    /// the file is cut back to the previous record boundary, so a failed
    /// append never reappears on recovery.
    pub fn append(&self, record: &JournalRecord) -> StoreResult<u64> {
        let payload = encode(record)?;
        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        write_frame(&mut frame, &payload)?;

        let mut w = self.writer.lock();
        if w.damaged {
            return Err(StoreError::Io(io::Error::other(format!(
                "journal {} has an unrecoverable partial record",
                self.path.display()
            ))));
        }
        let at = w.offset;
        if let Err(e) = self.write_durable(&mut w.file, &frame) {
            if let Err(rollback) = w.file.set_len(at) {
                warn!(
                    path = %self.path.display(),
                    offset = at,
                    error = %rollback,
                    "cannot roll back failed journal append"
                );
                w.damaged = true;
            }
            return Err(e.into());
        }
        w.offset += frame.len() as u64;
        w.records += 1;
        debug!(offset = at, len = payload.len(), "journal append");
        Ok(at)
    }

    /// Read every intact record from the start of the file.
    pub fn recover(&self) -> StoreResult<Vec<JournalRecord>> {
        let file = File::open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + HEADER_SIZE as u64 <= file_len {
            let mut header = [0u8; HEADER_SIZE];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE as u64 + u64::from(length) > file_len {
                warn!(
                    path = %self.path.display(),
                    offset,
                    length,
                    file_len,
                    "torn journal tail; stopping recovery"
                );
                break;
            }

            let mut payload = vec![0u8; length as usize];
            reader.read_exact(&mut payload)?;
            offset += HEADER_SIZE as u64 + u64::from(length);

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    path = %self.path.display(),
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "journal CRC mismatch; skipping record"
                );
                continue;
            }

            match bincode::deserialize::<JournalRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(offset, error = %e, "undecodable journal record; skipping");
                }
            }
        }

        self.writer.lock().records = records.len() as u64;
        debug!(path = %self.path.display(), recovered = records.len(), "journal recovery complete");
        Ok(records)
    }

    /// Drop every record.
    pub fn truncate(&self) -> StoreResult<()> {
        let mut w = self.writer.lock();
        w.file.set_len(0)?;
        w.offset = 0;
        w.records = 0;
        w.damaged = false;
        debug!(path = %self.path.display(), "journal truncated");
        Ok(())
    }

    /// Replace the journal with one `Put` per live entry.
    ///
    /// The new journal is written beside the old one and renamed over it, so
    /// a crash mid-rewrite leaves the previous journal intact.
    pub fn rewrite(&self, live: &[StoredEntry]) -> StoreResult<()> {
        let mut w = self.writer.lock();
        let tmp_path = self.path.with_extension("journal.tmp");
        let mut offset = 0u64;
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for entry in live {
                let payload = encode(&JournalRecord::Put(entry.clone()))?;
                write_frame(&mut tmp, &payload)?;
                offset += (HEADER_SIZE + payload.len()) as u64;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        w.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.offset = offset;
        w.records = live.len() as u64;
        w.damaged = false;
        debug!(path = %self.path.display(), live = live.len(), "journal compacted");
        Ok(())
    }

    /// Returns `true` once dead records exceed the configured slack.
    pub fn needs_compaction(&self, live_entries: usize) -> bool {
        let records = self.writer.lock().records;
        records > live_entries as u64 + self.config.compaction_slack
    }

    /// Flush buffered data and fsync.
    pub fn sync(&self) -> StoreResult<()> {
        self.writer.lock().file.sync_all()?;
        Ok(())
    }

    /// Current end of the journal in bytes.
    pub fn offset(&self) -> u64 {
        self.writer.lock().offset
    }

    /// Records currently in the journal.
    pub fn record_count(&self) -> u64 {
        self.writer.lock().records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_durable(&self, file: &mut File, frame: &[u8]) -> io::Result<()> {
        file.write_all(frame)?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            file.sync_all()?;
        }
        Ok(())
    }
}

fn encode(record: &JournalRecord) -> StoreResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn write_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let length = payload.len() as u32;
    let crc = crc32fast::hash(payload);
    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(payload)
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("offset", &self.offset())
            .finish()
    }
}
