//! Tier-2 secondary index
//!
//! Relational index over the digest bucket files: digest metadata, themes
//! and keywords as join tables, and a (file_path, byte_offset) pointer so
//! queries can load digest lines without scanning buckets.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, types::Value, Connection, OptionalExtension};

use crate::error::{KatraError, Result};
use crate::record::{Digest, DigestType, PeriodType};
use crate::tier1::Tier1Store;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS digests (
    digest_id TEXT PRIMARY KEY,
    ci_id TEXT NOT NULL,
    period_type INTEGER NOT NULL,
    period_id TEXT NOT NULL,
    digest_type INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    source_record_count INTEGER NOT NULL,
    archived INTEGER NOT NULL DEFAULT 0,
    file_path TEXT NOT NULL,
    byte_offset INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_digests_ci ON digests(ci_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_digests_period ON digests(period_type, period_id);

CREATE TABLE IF NOT EXISTS digest_themes (
    digest_id TEXT NOT NULL REFERENCES digests(digest_id) ON DELETE CASCADE,
    theme TEXT NOT NULL,
    PRIMARY KEY (digest_id, theme)
);

CREATE INDEX IF NOT EXISTS idx_themes_theme ON digest_themes(theme);

CREATE TABLE IF NOT EXISTS digest_keywords (
    digest_id TEXT NOT NULL REFERENCES digests(digest_id) ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    PRIMARY KEY (digest_id, keyword)
);

CREATE INDEX IF NOT EXISTS idx_keywords_keyword ON digest_keywords(keyword);
"#;

/// Where an indexed digest line lives
#[derive(Debug, Clone)]
pub struct DigestLocation {
    /// Digest id
    pub digest_id: String,
    /// Bucket file holding the line
    pub file_path: PathBuf,
    /// Byte offset of the line start
    pub byte_offset: u64,
    /// Archived overlay flag (the bucket line keeps its written state)
    pub archived: bool,
}

/// Query predicates over the index. `ci_id` is required.
#[derive(Debug, Clone, Default)]
pub struct DigestFilter {
    /// Owning agent (required)
    pub ci_id: String,
    /// Inclusive lower bound on digest timestamp (epoch seconds)
    pub start_ts: Option<i64>,
    /// Inclusive upper bound on digest timestamp (epoch seconds)
    pub end_ts: Option<i64>,
    /// Restrict to one period granularity
    pub period_type: Option<PeriodType>,
    /// Restrict to one digest type
    pub digest_type: Option<DigestType>,
    /// Substring match against themes
    pub theme: Option<String>,
    /// Substring match against keywords
    pub keyword: Option<String>,
    /// Result cap
    pub limit: Option<usize>,
}

impl DigestFilter {
    /// Filter for everything one agent archived
    pub fn for_agent(ci_id: impl Into<String>) -> Self {
        Self {
            ci_id: ci_id.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// INDEX
// ============================================================================

/// SQLite-backed digest index
pub struct DigestIndex {
    conn: Mutex<Connection>,
}

impl DigestIndex {
    /// Open (creating schema if absent)
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Tier1Store::configure_connection(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KatraError::LockPoisoned("tier2 index"))
    }

    /// Register one digest line
    pub fn insert(&self, digest: &Digest, file_path: &Path, byte_offset: u64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO digests (
                digest_id, ci_id, period_type, period_id, digest_type, timestamp,
                source_record_count, archived, file_path, byte_offset
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                digest.digest_id,
                digest.ci_id,
                digest.period_type.wire() as i64,
                digest.period_id,
                digest.digest_type.wire() as i64,
                digest.timestamp,
                digest.source_record_count as i64,
                digest.archived as i64,
                file_path.to_string_lossy(),
                byte_offset as i64,
            ],
        )?;
        let mut themes = conn
            .prepare("INSERT OR IGNORE INTO digest_themes (digest_id, theme) VALUES (?1, ?2)")?;
        for theme in &digest.themes {
            themes.execute(params![digest.digest_id, theme])?;
        }
        let mut keywords = conn
            .prepare("INSERT OR IGNORE INTO digest_keywords (digest_id, keyword) VALUES (?1, ?2)")?;
        for keyword in &digest.keywords {
            keywords.execute(params![digest.digest_id, keyword])?;
        }
        Ok(())
    }

    /// Locations matching a filter, newest first
    pub fn query(&self, filter: &DigestFilter) -> Result<Vec<DigestLocation>> {
        if filter.ci_id.trim().is_empty() {
            return Err(KatraError::MissingInput("ci_id"));
        }

        let mut sql = String::from(
            "SELECT digest_id, file_path, byte_offset, archived FROM digests WHERE ci_id = ?",
        );
        let mut values: Vec<Value> = vec![Value::Text(filter.ci_id.clone())];

        if let Some(start) = filter.start_ts {
            sql.push_str(" AND timestamp >= ?");
            values.push(Value::Integer(start));
        }
        if let Some(end) = filter.end_ts {
            sql.push_str(" AND timestamp <= ?");
            values.push(Value::Integer(end));
        }
        if let Some(period_type) = filter.period_type {
            sql.push_str(" AND period_type = ?");
            values.push(Value::Integer(period_type.wire() as i64));
        }
        if let Some(digest_type) = filter.digest_type {
            sql.push_str(" AND digest_type = ?");
            values.push(Value::Integer(digest_type.wire() as i64));
        }
        if let Some(theme) = &filter.theme {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM digest_themes t
                   WHERE t.digest_id = digests.digest_id AND t.theme LIKE ?)",
            );
            values.push(Value::Text(format!("%{}%", theme.to_lowercase())));
        }
        if let Some(keyword) = &filter.keyword {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM digest_keywords k
                   WHERE k.digest_id = digests.digest_id AND k.keyword LIKE ?)",
            );
            values.push(Value::Text(format!("%{}%", keyword.to_lowercase())));
        }
        sql.push_str(" ORDER BY timestamp DESC, digest_id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), |row| {
            Ok(DigestLocation {
                digest_id: row.get(0)?,
                file_path: PathBuf::from(row.get::<_, String>(1)?),
                byte_offset: row.get::<_, i64>(2)? as u64,
                archived: row.get::<_, i64>(3)? != 0,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Location of one digest
    pub fn get(&self, digest_id: &str) -> Result<Option<DigestLocation>> {
        let conn = self.conn()?;
        let location = conn
            .query_row(
                "SELECT digest_id, file_path, byte_offset, archived FROM digests
                 WHERE digest_id = ?1",
                params![digest_id],
                |row| {
                    Ok(DigestLocation {
                        digest_id: row.get(0)?,
                        file_path: PathBuf::from(row.get::<_, String>(1)?),
                        byte_offset: row.get::<_, i64>(2)? as u64,
                        archived: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    /// Flip the archived overlay flag (the only mutation a digest allows)
    pub fn set_archived(&self, digest_id: &str, archived: bool) -> Result<bool> {
        let changed = self.conn()?.execute(
            "UPDATE digests SET archived = ?1 WHERE digest_id = ?2",
            params![archived as i64, digest_id],
        )?;
        Ok(changed > 0)
    }

    /// Drop all index rows (rebuild prologue)
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM digest_themes", [])?;
        conn.execute("DELETE FROM digest_keywords", [])?;
        conn.execute("DELETE FROM digests", [])?;
        Ok(())
    }

    /// Indexed digest count
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM digests", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
