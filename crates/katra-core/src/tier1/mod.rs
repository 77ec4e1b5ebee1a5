//! Tier-1 store
//!
//! Hot record store: append-only JSONL journal for durability, SQLite index
//! for query. Writes journal first, then update the index; rebuilding the
//! index is a journal replay.

mod journal;
mod migrations;

pub use journal::{Journal, JournalEntry, JOURNAL_FILE};
pub use migrations::{apply_migrations, MIGRATIONS};

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, types::Value, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{KatraError, Result};
use crate::record::{
    IsolationLevel, MemoryRecord, MemoryType, MetadataUpdate, PadState, RecordFilter,
};

/// Index database file name inside the tier-1 directory
pub const INDEX_FILE: &str = "index.db";

/// Outcome of a store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// A new record landed in the store
    Inserted(String),
    /// An identical record inside the dedup window already existed;
    /// the call is silent success
    Deduplicated(String),
}

impl StoreOutcome {
    /// The id of the record the caller should use
    pub fn id(&self) -> &str {
        match self {
            StoreOutcome::Inserted(id) | StoreOutcome::Deduplicated(id) => id,
        }
    }

    /// True when the call inserted a fresh record
    pub fn is_inserted(&self) -> bool {
        matches!(self, StoreOutcome::Inserted(_))
    }
}

/// Per-agent Tier-1 statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier1Stats {
    /// Total records for the agent
    pub total: usize,
    /// Records per memory type
    pub by_type: Vec<(String, usize)>,
    /// Mean importance
    pub average_importance: f64,
    /// Records counted against the working-memory budget
    pub session_scoped: usize,
    /// Records pinned by explicit consent
    pub marked_important: usize,
    /// Oldest record timestamp
    pub oldest: Option<DateTime<Utc>>,
    /// Newest record timestamp
    pub newest: Option<DateTime<Utc>>,
}

fn ts_to_sql(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLS: &str = "id, ci_id, session_id, turn_id, memory_type, content, importance, \
     importance_note, created_at, last_accessed, marked_important, marked_forgettable, \
     emotion_intensity, emotion_type, pad_pleasure, pad_arousal, pad_dominance, pattern_id, \
     isolation, team_name, share_targets, session_scoped";

// ============================================================================
// STORE
// ============================================================================

/// Durable Tier-1 record store.
///
/// Separate writer/reader connections for interior mutability; all methods
/// take `&self`, so the engine can hold the store behind an `Arc` without an
/// outer mutex.
pub struct Tier1Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    journal: Journal,
    db_path: PathBuf,
}

impl Tier1Store {
    /// Apply the engine's PRAGMA block to a connection
    pub(crate) fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open the store under `dir` (creating files and schema as needed)
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let journal = Journal::open(dir)?;
        let db_path = dir.join(INDEX_FILE);

        let writer = Connection::open(&db_path)?;
        Self::configure_connection(&writer)?;
        migrations::apply_migrations(&writer)?;

        let reader = Connection::open(&db_path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            journal,
            db_path,
        })
    }

    /// Path of the index database (the vector and graph stores open their
    /// own connections against it)
    pub fn index_path(&self) -> &Path {
        &self.db_path
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| KatraError::LockPoisoned("tier1 writer"))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| KatraError::LockPoisoned("tier1 reader"))
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Store a record. Identical `ci_id`+`content` inside the dedup window
    /// collapses to silent success returning the existing id.
    pub fn store(&self, record: &MemoryRecord, dedup_window: Duration) -> Result<StoreOutcome> {
        if dedup_window > Duration::zero() {
            let since = ts_to_sql(record.created_at - dedup_window);
            let existing: Option<String> = self.reader()?.query_row(
                "SELECT id FROM records
                 WHERE ci_id = ?1 AND content = ?2 AND created_at >= ?3
                 ORDER BY created_at DESC LIMIT 1",
                params![record.ci_id, record.content, since],
                |row| row.get(0),
            )
            .optional()?;
            if let Some(id) = existing {
                tracing::debug!("Dedup hit for ci {} within window", record.ci_id);
                return Ok(StoreOutcome::Deduplicated(id));
            }
        }

        self.upsert(record)?;
        Ok(StoreOutcome::Inserted(record.id.clone()))
    }

    /// Journal a put event, then insert-or-update the index row.
    ///
    /// ON CONFLICT DO UPDATE rather than INSERT OR REPLACE: REPLACE would
    /// delete-and-reinsert the row and cascade away edges and embeddings.
    pub fn upsert(&self, record: &MemoryRecord) -> Result<()> {
        self.journal.append(&JournalEntry::Put {
            at: Utc::now(),
            record: record.clone(),
        })?;
        self.index_put(&*self.writer()?, record)
    }

    fn index_put(&self, conn: &Connection, record: &MemoryRecord) -> Result<()> {
        let share_targets = serde_json::to_string(&record.share_targets)?;
        conn.execute(
            "INSERT INTO records (
                id, ci_id, session_id, turn_id, memory_type, content, importance,
                importance_note, created_at, last_accessed, marked_important,
                marked_forgettable, emotion_intensity, emotion_type,
                pad_pleasure, pad_arousal, pad_dominance, pattern_id,
                isolation, team_name, share_targets, session_scoped
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22
            )
            ON CONFLICT(id) DO UPDATE SET
                ci_id = excluded.ci_id,
                session_id = excluded.session_id,
                turn_id = excluded.turn_id,
                memory_type = excluded.memory_type,
                content = excluded.content,
                importance = excluded.importance,
                importance_note = excluded.importance_note,
                created_at = excluded.created_at,
                last_accessed = excluded.last_accessed,
                marked_important = excluded.marked_important,
                marked_forgettable = excluded.marked_forgettable,
                emotion_intensity = excluded.emotion_intensity,
                emotion_type = excluded.emotion_type,
                pad_pleasure = excluded.pad_pleasure,
                pad_arousal = excluded.pad_arousal,
                pad_dominance = excluded.pad_dominance,
                pattern_id = excluded.pattern_id,
                isolation = excluded.isolation,
                team_name = excluded.team_name,
                share_targets = excluded.share_targets,
                session_scoped = excluded.session_scoped",
            params![
                record.id,
                record.ci_id,
                record.session_id,
                record.turn_id.map(|t| t as i64),
                record.memory_type.as_str(),
                record.content,
                record.importance,
                record.importance_note,
                ts_to_sql(record.created_at),
                record.last_accessed.map(ts_to_sql),
                record.marked_important as i64,
                record.marked_forgettable as i64,
                record.emotion_intensity,
                record.emotion_type,
                record.pad.map(|p| p.pleasure),
                record.pad.map(|p| p.arousal),
                record.pad.map(|p| p.dominance),
                record.pattern_id,
                record.isolation.as_str(),
                record.team_name,
                share_targets,
                record.session_scoped as i64,
            ],
        )?;
        Ok(())
    }

    /// Delete a record (journaled). Returns false when the id is unknown.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.journal.append(&JournalEntry::Delete {
            at: Utc::now(),
            id: id.to_string(),
        })?;
        let changed = self
            .writer()?
            .execute("DELETE FROM records WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Delete a batch of records (journaled)
    pub fn delete_many(&self, ids: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for id in ids {
            if self.delete(id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
        let pad = match (
            row.get::<_, Option<f64>>(14)?,
            row.get::<_, Option<f64>>(15)?,
            row.get::<_, Option<f64>>(16)?,
        ) {
            (Some(pleasure), Some(arousal), Some(dominance)) => Some(PadState {
                pleasure,
                arousal,
                dominance,
            }),
            _ => None,
        };
        let share_targets: Vec<String> = row
            .get::<_, String>(20)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Ok(MemoryRecord {
            id: row.get(0)?,
            ci_id: row.get(1)?,
            session_id: row.get(2)?,
            turn_id: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
            memory_type: MemoryType::parse_name(&row.get::<_, String>(4)?),
            content: row.get(5)?,
            importance: row.get(6)?,
            importance_note: row.get(7)?,
            created_at: ts_from_sql(&row.get::<_, String>(8)?),
            last_accessed: row.get::<_, Option<String>>(9)?.map(|s| ts_from_sql(&s)),
            marked_important: row.get::<_, i64>(10)? != 0,
            marked_forgettable: row.get::<_, i64>(11)? != 0,
            emotion_intensity: row.get(12)?,
            emotion_type: row.get(13)?,
            pad,
            graph_centrality: None,
            connection_count: None,
            pattern_id: row.get(17)?,
            isolation: IsolationLevel::parse_name(&row.get::<_, String>(18)?),
            team_name: row.get(19)?,
            share_targets,
            session_scoped: row.get::<_, i64>(21)? != 0,
        })
    }

    /// Fetch one record by id without touching its access time
    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let reader = self.reader()?;
        let record = reader
            .query_row(
                &format!("SELECT {SELECT_COLS} FROM records WHERE id = ?1"),
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Filtered query.
    ///
    /// Ordering is `created_at DESC, id ASC`; returned records have their
    /// `last_accessed` set to now (warmth is index-only state, so a journal
    /// replay resets it).
    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<MemoryRecord>> {
        if filter.ci_id.trim().is_empty() {
            return Err(KatraError::MissingInput("ci_id"));
        }

        let mut sql = format!("SELECT {SELECT_COLS} FROM records WHERE ci_id = ?");
        let mut values: Vec<Value> = vec![Value::Text(filter.ci_id.clone())];

        if let Some(start) = filter.start_time {
            sql.push_str(" AND created_at >= ?");
            values.push(Value::Text(ts_to_sql(start)));
        }
        if let Some(end) = filter.end_time {
            sql.push_str(" AND created_at <= ?");
            values.push(Value::Text(ts_to_sql(end)));
        }
        if let Some(memory_type) = filter.memory_type {
            sql.push_str(" AND memory_type = ?");
            values.push(Value::Text(memory_type.as_str().to_string()));
        }
        if let Some(min) = filter.min_importance {
            sql.push_str(" AND importance >= ?");
            values.push(Value::Real(min));
        }
        if let Some(scoped) = filter.session_scoped {
            sql.push_str(" AND session_scoped = ?");
            values.push(Value::Integer(scoped as i64));
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut records = {
            let reader = self.reader()?;
            let mut stmt = reader.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(values), Self::row_to_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let now = Utc::now();
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        self.touch_accessed(&ids, now)?;
        for record in &mut records {
            record.last_accessed = Some(now);
        }
        Ok(records)
    }

    /// Most recent record of an agent excluding one id, without touching
    /// access times (graph wiring probe, not a recall)
    pub fn most_recent_prior(&self, ci_id: &str, exclude_id: &str) -> Result<Option<MemoryRecord>> {
        let reader = self.reader()?;
        let record = reader
            .query_row(
                &format!(
                    "SELECT {SELECT_COLS} FROM records
                     WHERE ci_id = ?1 AND id != ?2
                     ORDER BY created_at DESC, id ASC LIMIT 1"
                ),
                params![ci_id, exclude_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Case-insensitive substring match on content for one agent.
    ///
    /// Hits count as access like any other query.
    pub fn keyword_search(&self, ci_id: &str, topic: &str) -> Result<Vec<MemoryRecord>> {
        if ci_id.trim().is_empty() {
            return Err(KatraError::MissingInput("ci_id"));
        }
        if topic.trim().is_empty() {
            return Err(KatraError::MissingInput("topic"));
        }
        let escaped = topic.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{}%", escaped.to_lowercase());
        let mut records = {
            let reader = self.reader()?;
            let mut stmt = reader.prepare(&format!(
                "SELECT {SELECT_COLS} FROM records
                 WHERE ci_id = ?1 AND LOWER(content) LIKE ?2 ESCAPE '\\'
                 ORDER BY created_at DESC, id ASC"
            ))?;
            let rows = stmt.query_map(params![ci_id, pattern], Self::row_to_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let now = Utc::now();
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        self.touch_accessed(&ids, now)?;
        for record in &mut records {
            record.last_accessed = Some(now);
        }
        Ok(records)
    }

    /// Set `last_accessed` for a batch of ids (index-only, not journaled)
    pub fn touch_accessed(&self, ids: &[String], at: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let writer = self.writer()?;
        let ts = ts_to_sql(at);
        let mut stmt = writer.prepare("UPDATE records SET last_accessed = ?1 WHERE id = ?2")?;
        for id in ids {
            stmt.execute(params![ts, id])?;
        }
        Ok(())
    }

    // ========================================================================
    // METADATA MUTATION
    // ========================================================================

    /// Partial metadata mutation; at least one field must be provided.
    /// Returns the updated record.
    pub fn update_metadata(&self, id: &str, update: &MetadataUpdate) -> Result<MemoryRecord> {
        if update.is_empty() {
            return Err(KatraError::MissingInput("metadata update fields"));
        }
        let mut record = self
            .get(id)?
            .ok_or_else(|| KatraError::NotFound(format!("record {id}")))?;

        if let Some(personal) = update.personal {
            if personal {
                record.isolation = IsolationLevel::Private;
                record.team_name = None;
                record.share_targets.clear();
            }
        }
        if let Some(pin) = update.not_to_archive {
            record.marked_important = pin;
            if pin {
                record.marked_forgettable = false;
            }
        }
        if let Some(collection) = &update.collection {
            record.pattern_id = Some(collection.clone());
        }

        self.upsert(&record)?;
        Ok(record)
    }

    /// Pin or unpin a record against archival and eviction
    pub fn set_marked_important(&self, id: &str, value: bool) -> Result<()> {
        let mut record = self
            .get(id)?
            .ok_or_else(|| KatraError::NotFound(format!("record {id}")))?;
        record.marked_important = value;
        if value {
            record.marked_forgettable = false;
        }
        self.upsert(&record)
    }

    /// Flag a record for archival at the next consolidation.
    ///
    /// A pinned record stays pinned: marked_important dominates.
    pub fn set_marked_forgettable(&self, id: &str, value: bool) -> Result<()> {
        let mut record = self
            .get(id)?
            .ok_or_else(|| KatraError::NotFound(format!("record {id}")))?;
        if record.marked_important && value {
            return Ok(());
        }
        record.marked_forgettable = value;
        self.upsert(&record)
    }

    /// Assign a batch of records to one pattern group
    pub fn assign_pattern(&self, ids: &[String], pattern_id: &str) -> Result<usize> {
        if pattern_id.trim().is_empty() {
            return Err(KatraError::MissingInput("pattern_id"));
        }
        let mut updated = 0;
        for id in ids {
            if let Some(mut record) = self.get(id)? {
                record.pattern_id = Some(pattern_id.to_string());
                self.upsert(&record)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    // ========================================================================
    // MAINTENANCE SUPPORT
    // ========================================================================

    /// Records eligible for archival evaluation: explicitly forgettable or
    /// older than the cutoff. Pins are included; the policy skips them and
    /// counts the skip.
    pub fn archival_candidates(
        &self,
        ci_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MemoryRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {SELECT_COLS} FROM records
             WHERE ci_id = ?1 AND (marked_forgettable = 1 OR created_at < ?2)
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![ci_id, ts_to_sql(cutoff)], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Oldest session-scoped records for one agent, ascending by age
    pub fn oldest_session_scoped(&self, ci_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {SELECT_COLS} FROM records
             WHERE ci_id = ?1 AND session_scoped = 1
             ORDER BY created_at ASC, id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![ci_id, limit as i64], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Un-scope a batch of records: they stay but stop counting against the
    /// working-memory budget (journaled)
    pub fn clear_session_scope(&self, ids: &[String]) -> Result<usize> {
        let mut updated = 0;
        for id in ids {
            if let Some(mut record) = self.get(id)? {
                if record.session_scoped {
                    record.session_scoped = false;
                    self.upsert(&record)?;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    /// Session-scoped record count for one agent
    pub fn session_scoped_count(&self, ci_id: &str) -> Result<usize> {
        let count: i64 = self.reader()?.query_row(
            "SELECT COUNT(*) FROM records WHERE ci_id = ?1 AND session_scoped = 1",
            params![ci_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Record count for one agent
    pub fn count(&self, ci_id: &str) -> Result<usize> {
        let count: i64 = self.reader()?.query_row(
            "SELECT COUNT(*) FROM records WHERE ci_id = ?1",
            params![ci_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Record count across all agents (health input)
    pub fn total_count(&self) -> Result<usize> {
        let count: i64 =
            self.reader()?
                .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Every agent with at least one record
    pub fn all_agents(&self) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT DISTINCT ci_id FROM records ORDER BY ci_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// (id, content) pairs for one agent — embedding regeneration input
    pub fn all_content(&self, ci_id: &str) -> Result<Vec<(String, String)>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare("SELECT id, content FROM records WHERE ci_id = ?1 ORDER BY created_at")?;
        let rows = stmt.query_map(params![ci_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Append an archival audit row
    pub fn record_archive(
        &self,
        ci_id: &str,
        digest_id: &str,
        period_id: &str,
        records_archived: usize,
    ) -> Result<()> {
        self.writer()?.execute(
            "INSERT INTO archive_log (ci_id, digest_id, period_id, records_archived, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ci_id,
                digest_id,
                period_id,
                records_archived as i64,
                ts_to_sql(Utc::now())
            ],
        )?;
        Ok(())
    }

    /// Per-agent statistics for the metacognition surface
    pub fn stats(&self, ci_id: &str) -> Result<Tier1Stats> {
        let reader = self.reader()?;
        let (total, average_importance, oldest, newest): (i64, Option<f64>, Option<String>, Option<String>) =
            reader.query_row(
                "SELECT COUNT(*), AVG(importance), MIN(created_at), MAX(created_at)
                 FROM records WHERE ci_id = ?1",
                params![ci_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        let session_scoped: i64 = reader.query_row(
            "SELECT COUNT(*) FROM records WHERE ci_id = ?1 AND session_scoped = 1",
            params![ci_id],
            |row| row.get(0),
        )?;
        let marked_important: i64 = reader.query_row(
            "SELECT COUNT(*) FROM records WHERE ci_id = ?1 AND marked_important = 1",
            params![ci_id],
            |row| row.get(0),
        )?;
        let mut stmt = reader.prepare(
            "SELECT memory_type, COUNT(*) FROM records WHERE ci_id = ?1
             GROUP BY memory_type ORDER BY COUNT(*) DESC",
        )?;
        let by_type = stmt
            .query_map(params![ci_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Tier1Stats {
            total: total as usize,
            by_type,
            average_importance: average_importance.unwrap_or(0.0),
            session_scoped: session_scoped as usize,
            marked_important: marked_important as usize,
            oldest: oldest.as_deref().map(ts_from_sql),
            newest: newest.as_deref().map(ts_from_sql),
        })
    }

    // ========================================================================
    // DURABILITY
    // ========================================================================

    /// fsync the journal and checkpoint the index WAL
    pub fn flush(&self) -> Result<()> {
        self.journal.sync()?;
        self.writer()?
            .execute_batch("PRAGMA wal_checkpoint(FULL);")?;
        Ok(())
    }

    /// Shutdown checkpoint: truncate the WAL back into the main file
    pub fn checkpoint_truncate(&self) -> Result<()> {
        self.writer()?
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    /// Rebuild the index from the journal. Returns the number of live
    /// records after replay.
    pub fn rebuild_index(&self) -> Result<usize> {
        let entries = self.journal.replay()?;
        let writer = self.writer()?;
        writer.execute("DELETE FROM records", [])?;
        for entry in entries {
            match entry {
                JournalEntry::Put { record, .. } => self.index_put(&writer, &record)?,
                JournalEntry::Delete { id, .. } => {
                    writer.execute("DELETE FROM records WHERE id = ?1", params![id])?;
                }
            }
        }
        let count: i64 = writer.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ============================================================================
// TESTS
// ============================================================================
