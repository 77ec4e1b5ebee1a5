//! Tier-1 write-ahead journal
//!
//! Newline-delimited JSON event log under `memory/tier1/`. Every mutation
//! appends here before the index sees it; replaying the log in order
//! reproduces the exact index state, which is the crash-recovery and
//! index-rebuild path.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KatraError, Result};
use crate::record::MemoryRecord;

/// Journal file name inside the tier-1 directory
pub const JOURNAL_FILE: &str = "records.jsonl";

/// One journal event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum JournalEntry {
    /// Insert or replace a record
    Put {
        /// Event time
        at: DateTime<Utc>,
        /// Full record state after the write
        record: MemoryRecord,
    },
    /// Remove a record
    Delete {
        /// Event time
        at: DateTime<Utc>,
        /// Record id
        id: String,
    },
}

/// Append-only journal handle
pub struct Journal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl Journal {
    /// Open (creating if absent) the journal inside `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(JOURNAL_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one event. The line is flushed to the OS; call [`Journal::sync`]
    /// for the fsync barrier.
    pub fn append(&self, entry: &JournalEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| KatraError::LockPoisoned("tier1 journal"))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// fsync durability barrier
    pub fn sync(&self) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| KatraError::LockPoisoned("tier1 journal"))?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Replay every event in write order.
    ///
    /// Lines that fail to parse are skipped with a warning rather than
    /// aborting the replay; a torn final line after a crash is expected.
    pub fn replay(&self) -> Result<Vec<JournalEntry>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Skipping corrupt journal line {}: {}", line_no + 1, e);
                }
            }
        }
        Ok(entries)
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
