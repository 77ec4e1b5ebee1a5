//! Runtime configuration
//!
//! One value struct per concern, all carried by [`KatraConfig`]. Everything
//! here is runtime state, not compile-time features: toggling a flag through
//! the engine's setters constructs or tears down the associated index.

use serde::{Deserialize, Serialize};

use crate::vector::EmbeddingScheme;

/// Working-memory budget limits (session-scoped records per agent)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetConfig {
    /// Whether hygiene eviction runs at all
    pub enabled: bool,
    /// Above this count the oldest batch is un-scoped (archive semantics)
    pub soft_limit: usize,
    /// At or above this count the oldest batch is deleted
    pub hard_limit: usize,
    /// How many records one tick touches
    pub batch_size: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            soft_limit: 100,
            hard_limit: 200,
            batch_size: 10,
        }
    }
}

/// Message bus limits and cleanup windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusConfig {
    /// Batch pop cap for hear_all
    pub max_messages: usize,
    /// Content length cap in bytes
    pub max_message_length: usize,
    /// Registry capacity for new registrations
    pub max_active_cis: usize,
    /// Broadcast history rows older than this are deleted on cleanup
    pub message_ttl_hours: i64,
    /// Registry rows whose last_seen predates this are deleted on cleanup
    pub stale_timeout_secs: i64,
    /// history() slice cap
    pub max_history_count: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_messages: 100,
            max_message_length: 1024,
            max_active_cis: 32,
            message_ttl_hours: 24,
            stale_timeout_secs: 3600,
            max_history_count: 100,
        }
    }
}

/// Archival policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivalConfig {
    /// Records older than this many days are archival candidates
    pub archive_after_days: i64,
    /// Accesses younger than this window are the archival probe itself and
    /// do not count as "recently accessed"
    pub access_ignore_window_secs: i64,
    /// emotion_intensity at or above this pins a record in Tier 1
    pub high_emotion_threshold: f64,
    /// Graph centrality at or above this pins a record in Tier 1
    pub high_centrality_threshold: f64,
    /// Digest bucket files refuse appends at this size
    pub tier2_max_file_size_mb: u64,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            archive_after_days: 7,
            access_ignore_window_secs: 300,
            high_emotion_threshold: 0.7,
            high_centrality_threshold: 0.5,
            tier2_max_file_size_mb: 64,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KatraConfig {
    /// Identical ci_id+content stores inside this window collapse silently
    pub dedup_window_secs: i64,
    /// Record content cap in bytes
    pub max_record_len: usize,

    /// Semantic hits below this similarity are dropped from hybrid search
    pub semantic_threshold: f32,
    /// SIMILAR edges are created at or above this similarity
    pub similarity_threshold: f32,
    /// Cap on auto-created SIMILAR edges per new record
    pub max_similar_edges: usize,
    /// SEQUENTIAL edges only link records this close in time
    pub temporal_window_secs: i64,

    /// Whether the vector index is live
    pub semantic_search_enabled: bool,
    /// How embeddings are produced
    #[serde(default)]
    pub embedding_scheme: EmbeddingScheme,
    /// Whether automatic graph wiring is live
    pub graph_edges_enabled: bool,

    /// Tier-1 count below which health is "healthy"
    pub tier1_soft_limit: usize,
    /// Tier-1 count at which health is "critical"
    pub tier1_hard_limit: usize,
    /// Under critical pressure, writes below this importance are refused
    pub critical_importance_floor: f64,

    /// Maintenance cadence
    pub maintenance_interval_secs: u64,

    /// Archival policy
    pub archival: ArchivalConfig,
    /// Working-memory budget
    pub budget: BudgetConfig,
    /// Message bus
    pub bus: BusConfig,
}

impl Default for KatraConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 60,
            max_record_len: 4096,
            semantic_threshold: 0.3,
            similarity_threshold: 0.55,
            max_similar_edges: 5,
            temporal_window_secs: 3600,
            semantic_search_enabled: true,
            embedding_scheme: EmbeddingScheme::TfIdf,
            graph_edges_enabled: true,
            tier1_soft_limit: 10_000,
            tier1_hard_limit: 50_000,
            critical_importance_floor: 0.75,
            maintenance_interval_secs: 6 * 60 * 60,
            archival: ArchivalConfig::default(),
            budget: BudgetConfig::default(),
            bus: BusConfig::default(),
        }
    }
}
