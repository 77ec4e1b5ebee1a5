//! Memory lifecycle journeys
//!
//! Dedup on write, archival into Tier-2 digests, explicit pins, and the
//! working-memory budget, driven through the public engine surface.

use chrono::{Duration, Utc};
use katra_core::{
    period_id_for, BudgetAction, BudgetConfig, CreateRecordInput, DigestFilter, KatraConfig,
    PeriodType, RecordFilter,
};
use katra_e2e_tests::harness::{seed_aged_record, seed_session_scoped, TestEngine};

#[test]
fn dedup_collapses_identical_stores_within_window() {
    let t = TestEngine::new();

    let first = t
        .engine
        .remember(CreateRecordInput::new("alice", "build succeeded"))
        .unwrap();
    // Second identical call inside the window: silent success, same record
    let second = t
        .engine
        .remember(CreateRecordInput::new("alice", "build succeeded"))
        .unwrap();

    assert_eq!(first.id, second.id);
    let records = t.engine.recall(&RecordFilter::for_agent("alice")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "build succeeded");
}

#[test]
fn archival_moves_old_records_into_weekly_digest() {
    let t = TestEngine::new();
    let base = Utc::now() - Duration::days(30);

    for i in 0..200 {
        seed_aged_record(t.engine.tier1(), "alice", &format!("daily note {i}"), 30);
    }

    let report = t.engine.archive_older_than("alice", 7).unwrap();
    assert_eq!(report.records_archived, 200);
    assert_eq!(report.digests_written, 1);

    // Tier 1 is empty of those records
    assert_eq!(
        t.engine.recall(&RecordFilter::for_agent("alice")).unwrap().len(),
        0
    );

    // The weekly bucket for that period holds the digest
    let digests = t.engine.digests(&DigestFilter::for_agent("alice")).unwrap();
    assert_eq!(digests.len(), 1);
    let digest = &digests[0];
    assert_eq!(digest.source_record_count, 200);
    assert_eq!(digest.period_type, PeriodType::Weekly);
    assert_eq!(digest.period_id, period_id_for(PeriodType::Weekly, base));

    // Archived content stays recoverable from the digest
    assert!(digest.summary.contains("daily note 42"));
}

#[test]
fn marked_important_records_survive_archival() {
    let t = TestEngine::new();

    let mut pinned_ids = Vec::new();
    for i in 0..200 {
        let record = seed_aged_record(t.engine.tier1(), "alice", &format!("note {i}"), 30);
        if i < 3 {
            t.engine.mark_important(&record.id).unwrap();
            pinned_ids.push(record.id);
        }
    }

    let report = t.engine.archive_older_than("alice", 7).unwrap();
    assert_eq!(report.records_archived, 197);
    assert_eq!(report.skipped_pinned, 3);

    let survivors = t.engine.recall(&RecordFilter::for_agent("alice")).unwrap();
    assert_eq!(survivors.len(), 3);
    let mut survivor_ids: Vec<String> = survivors.into_iter().map(|r| r.id).collect();
    survivor_ids.sort();
    pinned_ids.sort();
    assert_eq!(survivor_ids, pinned_ids);
}

#[test]
fn marked_forgettable_archives_regardless_of_age() {
    let t = TestEngine::new();

    let fresh = t
        .engine
        .remember(CreateRecordInput::new("alice", "scratch thought"))
        .unwrap();
    t.engine.mark_forgettable(&fresh.id).unwrap();
    t.engine
        .remember(CreateRecordInput::new("alice", "keep this one"))
        .unwrap();

    let report = t.engine.archive_older_than("alice", 7).unwrap();
    assert_eq!(report.records_archived, 1);
    assert!(t.engine.get_record(&fresh.id).unwrap().is_none());

    let survivors = t.engine.recall(&RecordFilter::for_agent("alice")).unwrap();
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].content, "keep this one");
}

#[test]
fn budget_hard_then_soft_then_fixpoint() {
    let t = TestEngine::with_config(KatraConfig {
        budget: BudgetConfig {
            enabled: true,
            soft_limit: 10,
            hard_limit: 15,
            batch_size: 3,
        },
        dedup_window_secs: 0,
        ..Default::default()
    });

    seed_session_scoped(&t.engine, "alice", 16);

    // Hard path: 16 >= 15, delete oldest 3
    assert_eq!(
        t.engine.budget_tick("alice").unwrap(),
        BudgetAction::Evicted(3)
    );
    assert_eq!(
        t.engine.recall(&RecordFilter::for_agent("alice")).unwrap().len(),
        13
    );

    // Soft path: 13 > 10, un-scope oldest 3 (records stay)
    assert_eq!(
        t.engine.budget_tick("alice").unwrap(),
        BudgetAction::Softened(3)
    );
    assert_eq!(
        t.engine.recall(&RecordFilter::for_agent("alice")).unwrap().len(),
        13
    );

    // Exactly at the soft limit: no-op forever after
    assert_eq!(t.engine.budget_tick("alice").unwrap(), BudgetAction::None);
    assert_eq!(t.engine.budget_tick("alice").unwrap(), BudgetAction::None);
}

#[test]
fn maintenance_twice_with_no_new_data_is_idempotent() {
    let t = TestEngine::new();
    for i in 0..20 {
        seed_aged_record(t.engine.tier1(), "alice", &format!("old {i}"), 30);
    }

    let first = t.engine.run_maintenance();
    assert_eq!(first.errors, 0);
    assert_eq!(first.archive.records_archived, 20);

    let second = t.engine.run_maintenance();
    assert_eq!(second.errors, 0);
    assert_eq!(second.archive.records_archived, 0);
    assert_eq!(second.archive.digests_written, 0);

    // One digest total, not two
    let digests = t.engine.digests(&DigestFilter::for_agent("alice")).unwrap();
    assert_eq!(digests.len(), 1);
}

#[test]
fn digest_roundtrips_through_store_and_query() {
    let t = TestEngine::new();
    seed_aged_record(t.engine.tier1(), "alice", "deployed v1 and wrote the runbook", 30);
    t.engine.archive_older_than("alice", 7).unwrap();

    let digests = t.engine.digests(&DigestFilter::for_agent("alice")).unwrap();
    let by_id = t
        .engine
        .digest_by_id(&digests[0].digest_id)
        .unwrap()
        .unwrap();
    assert_eq!(by_id, digests[0]);

    // Rebuilding the index preserves the query result
    t.engine.rebuild_digest_index().unwrap();
    let rebuilt = t.engine.digests(&DigestFilter::for_agent("alice")).unwrap();
    assert_eq!(rebuilt.len(), 1);
    assert_eq!(rebuilt[0].digest_id, digests[0].digest_id);
}

#[test]
fn update_metadata_pins_against_the_next_archival() {
    let t = TestEngine::new();
    let record = seed_aged_record(t.engine.tier1(), "alice", "worth keeping", 30);

    t.engine
        .update_metadata(
            &record.id,
            &katra_core::MetadataUpdate {
                personal: None,
                not_to_archive: Some(true),
                collection: Some("keepers".into()),
            },
        )
        .unwrap();

    t.engine.archive_older_than("alice", 7).unwrap();
    let survivor = t.engine.get_record(&record.id).unwrap().unwrap();
    assert!(survivor.marked_important);
    assert_eq!(survivor.pattern_id.as_deref(), Some("keepers"));
}
