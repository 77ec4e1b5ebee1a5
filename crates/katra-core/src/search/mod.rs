//! Hybrid retrieval
//!
//! Fuses keyword hits (case-insensitive substring, score 1.0) with vector
//! hits (cosine similarity) by taking the max score per record. Each result
//! carries provenance flags so callers can see which phase found it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::record::MemoryRecord;

/// Score assigned to every keyword hit
pub const KEYWORD_SCORE: f32 = 1.0;

/// One hybrid search result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// The matched record
    pub record: MemoryRecord,
    /// Fused score: max of the phases that found it
    pub score: f32,
    /// Found by the keyword phase
    pub from_keyword: bool,
    /// Found by the semantic phase
    pub from_semantic: bool,
    /// Added by graph context expansion, not a direct match
    pub from_association: bool,
}

/// Tuning for the hybrid search
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    /// Vector hits below this similarity are dropped
    pub semantic_threshold: f32,
    /// How many vector candidates to pull before thresholding
    pub semantic_top_k: usize,
    /// How many top hits to expand through the graph (0 disables)
    pub expand_top: usize,
    /// Score damping applied to association hits
    pub association_damping: f32,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.3,
            semantic_top_k: 20,
            expand_top: 3,
            association_damping: 0.5,
        }
    }
}

/// Merge the two phases by record id, taking the max score.
///
/// Ordering: score descending, then timestamp descending, then id ascending
/// as the stable tie-break.
pub fn fuse(
    keyword_hits: Vec<MemoryRecord>,
    semantic_hits: Vec<(MemoryRecord, f32)>,
) -> Vec<SearchHit> {
    let mut merged: HashMap<String, SearchHit> = HashMap::new();

    for record in keyword_hits {
        merged.insert(
            record.id.clone(),
            SearchHit {
                record,
                score: KEYWORD_SCORE,
                from_keyword: true,
                from_semantic: false,
                from_association: false,
            },
        );
    }

    for (record, similarity) in semantic_hits {
        match merged.get_mut(&record.id) {
            Some(hit) => {
                hit.from_semantic = true;
                hit.score = hit.score.max(similarity);
            }
            None => {
                merged.insert(
                    record.id.clone(),
                    SearchHit {
                        record,
                        score: similarity,
                        from_keyword: false,
                        from_semantic: true,
                        from_association: false,
                    },
                );
            }
        }
    }

    let mut hits: Vec<SearchHit> = merged.into_values().collect();
    sort_hits(&mut hits);
    hits
}

/// Sort hits by score descending, timestamp descending, id ascending
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.record.created_at.cmp(&a.record.created_at))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
}

/// Append association hits for records the direct phases missed.
///
/// Association hits never displace direct hits and arrive pre-damped, so
/// they naturally sort below what the caller actually searched for.
pub fn append_associations(
    hits: &mut Vec<SearchHit>,
    associations: Vec<(MemoryRecord, f32)>,
    damping: f32,
) {
    for (record, weight) in associations {
        if hits.iter().any(|h| h.record.id == record.id) {
            continue;
        }
        hits.push(SearchHit {
            record,
            score: weight * damping,
            from_keyword: false,
            from_semantic: false,
            from_association: true,
        });
    }
    sort_hits(hits);
}

// ============================================================================
// TESTS
// ============================================================================
