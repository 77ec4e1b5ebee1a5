//! Test engine harness
//!
//! Every test gets its own engine over a temporary home directory; the
//! directory dies with the harness.

use chrono::{Duration, Utc};
use katra_core::{CreateRecordInput, Katra, KatraConfig, MemoryRecord, Tier1Store};
use tempfile::TempDir;

/// An isolated engine over a temporary home
pub struct TestEngine {
    /// The engine under test
    pub engine: Katra,
    /// Kept alive so the home directory survives the test body
    _home: TempDir,
}

impl TestEngine {
    /// Engine with default configuration
    pub fn new() -> Self {
        Self::with_config(KatraConfig::default())
    }

    /// Engine with custom configuration
    pub fn with_config(config: KatraConfig) -> Self {
        let home = TempDir::new().expect("temp home");
        let engine = Katra::open(home.path(), config).expect("engine open");
        Self {
            engine,
            _home: home,
        }
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Store a record with a back-dated creation time, bypassing the dedup
/// window (aged seeding goes straight to the Tier-1 store)
pub fn seed_aged_record(
    tier1: &Tier1Store,
    ci_id: &str,
    content: &str,
    age_days: i64,
) -> MemoryRecord {
    let mut record = CreateRecordInput::new(ci_id, content)
        .into_record(4096)
        .expect("valid record");
    record.created_at = Utc::now() - Duration::days(age_days);
    tier1
        .store(&record, Duration::zero())
        .expect("seed store");
    record
}

/// Store a batch of session-scoped records with increasing ages
pub fn seed_session_scoped(engine: &Katra, ci_id: &str, count: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..count {
        let mut input = CreateRecordInput::new(ci_id, format!("session note {i}"));
        input.session_scoped = true;
        let record = engine.remember(input).expect("remember");
        ids.push(record.id);
    }
    ids
}
