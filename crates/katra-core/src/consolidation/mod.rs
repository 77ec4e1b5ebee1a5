//! Consolidation and archival
//!
//! Decides what leaves Tier 1 and folds it into Tier-2 digests. The policy
//! is pure; the archiver wires it to the stores and deletes sources only
//! after their digest is durable.

mod summarizer;

pub use summarizer::{DigestDraft, ExtractiveSummarizer, Summarizer};

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ArchivalConfig;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::record::{period_id_for, Digest, MemoryRecord, PeriodType};
use crate::tier1::Tier1Store;
use crate::tier2::DigestStore;
use crate::vector::VectorStore;

// ============================================================================
// POLICY
// ============================================================================

/// Why a record stays or goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivalDecision {
    /// Explicit consent pin; never archived
    Pinned,
    /// Explicit consent to forget; archived regardless of age
    ForgetRequested,
    /// Old and cold; archive
    Archive,
    /// Younger than the cutoff
    TooYoung,
    /// Accessed inside the warmth window
    RecentlyAccessed,
    /// Emotionally hot
    HighEmotion,
    /// Well-connected in the association graph
    HighCentrality,
}

impl ArchivalDecision {
    /// Whether this decision sends the record into a digest
    pub fn archives(&self) -> bool {
        matches!(self, ArchivalDecision::ForgetRequested | ArchivalDecision::Archive)
    }
}

/// The archival rules as a pure function over one record
#[derive(Debug, Clone)]
pub struct ArchivalPolicy {
    config: ArchivalConfig,
}

impl ArchivalPolicy {
    /// Policy with the given knobs
    pub fn new(config: ArchivalConfig) -> Self {
        Self { config }
    }

    /// Evaluate one record against the cutoff.
    ///
    /// `recently_accessed` deliberately ignores accesses younger than the
    /// ignore window: the archival pass itself touches `last_accessed`
    /// through the query path, and that probe must not look like warmth.
    pub fn evaluate(
        &self,
        record: &MemoryRecord,
        centrality: f64,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> ArchivalDecision {
        if record.marked_important {
            return ArchivalDecision::Pinned;
        }
        if record.marked_forgettable {
            return ArchivalDecision::ForgetRequested;
        }

        let recently_accessed = match record.last_accessed {
            Some(accessed) => {
                let since = now - accessed;
                since > Duration::seconds(self.config.access_ignore_window_secs)
                    && since < Duration::days(7)
            }
            None => false,
        };
        let high_emotion = record.emotion_intensity >= self.config.high_emotion_threshold;
        let high_centrality = centrality >= self.config.high_centrality_threshold;
        let too_old = record.created_at < cutoff;

        if !too_old {
            ArchivalDecision::TooYoung
        } else if recently_accessed {
            ArchivalDecision::RecentlyAccessed
        } else if high_emotion {
            ArchivalDecision::HighEmotion
        } else if high_centrality {
            ArchivalDecision::HighCentrality
        } else {
            ArchivalDecision::Archive
        }
    }
}

// ============================================================================
// ARCHIVER
// ============================================================================

/// Result of one archival run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    /// Records folded into digests and deleted from Tier 1
    pub records_archived: usize,
    /// Digests written
    pub digests_written: usize,
    /// Records kept by an explicit pin
    pub skipped_pinned: usize,
    /// Records kept by warmth, emotion, or centrality
    pub skipped_hot: usize,
}

/// Wires the policy to the stores
pub struct Archiver<'a> {
    /// Source tier
    pub tier1: &'a Tier1Store,
    /// Destination tier
    pub tier2: &'a DigestStore,
    /// Edge cleanup and centrality input; None when graph wiring is off
    pub graph: Option<&'a GraphStore>,
    /// Embedding cleanup; None when semantic search is off
    pub vector: Option<&'a VectorStore>,
    /// Digest field producer
    pub summarizer: &'a dyn Summarizer,
    /// Policy knobs
    pub config: &'a ArchivalConfig,
}

impl Archiver<'_> {
    /// Archive one agent's records older than `days`.
    ///
    /// Candidates group by `(period_type, period_id)` of their creation
    /// time; each group becomes one digest, stored before its sources are
    /// deleted. Returns the per-run report.
    pub fn archive_older_than(&self, ci_id: &str, days: i64) -> Result<ArchiveReport> {
        let now = Utc::now();
        let cutoff = now - Duration::days(days);
        let policy = ArchivalPolicy::new(self.config.clone());

        let mut report = ArchiveReport::default();
        let mut buckets: BTreeMap<String, Vec<MemoryRecord>> = BTreeMap::new();

        for record in self.tier1.archival_candidates(ci_id, cutoff)? {
            let centrality = match self.graph {
                Some(graph) => graph.centrality(&record.id)?,
                None => 0.0,
            };
            match policy.evaluate(&record, centrality, now, cutoff) {
                decision if decision.archives() => {
                    let period_id = period_id_for(PeriodType::Weekly, record.created_at);
                    buckets.entry(period_id).or_default().push(record);
                }
                ArchivalDecision::Pinned => report.skipped_pinned += 1,
                _ => report.skipped_hot += 1,
            }
        }

        for (period_id, records) in buckets {
            let draft = self.summarizer.summarize(&records);
            let mut digest = Digest::new(ci_id, PeriodType::Weekly, period_id.as_str());
            digest.source_record_count = records.len();
            digest.digest_type = draft.digest_type;
            digest.themes = draft.themes;
            digest.keywords = draft.keywords;
            digest.entities = draft.entities;
            digest.summary = draft.summary;
            digest.key_insights = draft.key_insights;
            digest.questions_asked = draft.questions_asked;
            digest.decisions_made = draft.decisions_made;

            self.tier2.store_digest(&digest)?;

            for record in &records {
                self.tier1.delete(&record.id)?;
                if let Some(graph) = self.graph {
                    graph.remove_record(&record.id)?;
                }
                if let Some(vector) = self.vector {
                    vector.remove(&record.id)?;
                }
            }

            self.tier1
                .record_archive(ci_id, &digest.digest_id, &period_id, records.len())?;
            tracing::info!(
                ci_id = %ci_id,
                period_id = %period_id,
                records = records.len(),
                digest_id = %digest.digest_id,
                "archived tier1 records into digest"
            );

            report.records_archived += records.len();
            report.digests_written += 1;
        }

        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
