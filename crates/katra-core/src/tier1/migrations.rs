//! Tier-1 index migrations
//!
//! Schema migration definitions for the record index database. The vector
//! and graph stores share this file (separate connections, same schema
//! owner), so their tables live here too.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: records, graph edges, embeddings",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Emotional context: PAD triple, pattern grouping",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Archival audit log",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    ci_id TEXT NOT NULL,
    session_id TEXT,
    turn_id INTEGER,
    memory_type TEXT NOT NULL DEFAULT 'experience',
    content TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    importance_note TEXT,
    created_at TEXT NOT NULL,
    last_accessed TEXT,
    marked_important INTEGER NOT NULL DEFAULT 0,
    marked_forgettable INTEGER NOT NULL DEFAULT 0,
    emotion_intensity REAL NOT NULL DEFAULT 0.0,
    emotion_type TEXT,
    isolation TEXT NOT NULL DEFAULT 'private',
    team_name TEXT,
    share_targets TEXT NOT NULL DEFAULT '[]',
    session_scoped INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_records_ci_created ON records(ci_id, created_at);
CREATE INDEX IF NOT EXISTS idx_records_type ON records(memory_type);
CREATE INDEX IF NOT EXISTS idx_records_importance ON records(importance);
CREATE INDEX IF NOT EXISTS idx_records_session_scoped ON records(ci_id, session_scoped);

-- Association graph edges; deleting a record deletes its edges
CREATE TABLE IF NOT EXISTS graph_edges (
    src_id TEXT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    dst_id TEXT NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    reason TEXT,
    weight REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (src_id, dst_id, label)
);

CREATE INDEX IF NOT EXISTS idx_edges_src ON graph_edges(src_id);
CREATE INDEX IF NOT EXISTS idx_edges_dst ON graph_edges(dst_id);

-- Embeddings storage (f32 little-endian blobs)
CREATE TABLE IF NOT EXISTS embeddings (
    record_id TEXT PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
    ci_id TEXT NOT NULL,
    vector BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    scheme TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_ci ON embeddings(ci_id);

-- TF-IDF corpus statistics, updated only while indexing
CREATE TABLE IF NOT EXISTS embedding_stats (
    term TEXT PRIMARY KEY,
    doc_freq INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS embedding_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: PAD emotional triple and pattern grouping
const MIGRATION_V2_UP: &str = r#"
ALTER TABLE records ADD COLUMN pad_pleasure REAL;
ALTER TABLE records ADD COLUMN pad_arousal REAL;
ALTER TABLE records ADD COLUMN pad_dominance REAL;
ALTER TABLE records ADD COLUMN pattern_id TEXT;

CREATE INDEX IF NOT EXISTS idx_records_pattern ON records(pattern_id);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Archival audit log, one row per digest produced
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS archive_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ci_id TEXT NOT NULL,
    digest_id TEXT NOT NULL,
    period_id TEXT NOT NULL,
    records_archived INTEGER NOT NULL,
    completed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_archive_log_ci ON archive_log(ci_id);
CREATE INDEX IF NOT EXISTS idx_archive_log_completed ON archive_log(completed_at);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying tier1 migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
