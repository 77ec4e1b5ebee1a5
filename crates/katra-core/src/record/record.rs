//! Memory record - the Tier-1 unit
//!
//! A record is one typed memory event owned by one agent. Validation lives
//! here so every ingress path (engine call, journal replay, index rebuild)
//! enforces the same invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KatraError, Result};
use crate::record::types::{IsolationLevel, MemoryType, WhyRemember};

// ============================================================================
// PAD EMOTIONAL STATE
// ============================================================================

/// Pleasure-Arousal-Dominance triple, each in [-1,1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PadState {
    /// Pleasure axis
    pub pleasure: f64,
    /// Arousal axis
    pub arousal: f64,
    /// Dominance axis
    pub dominance: f64,
}

impl PadState {
    /// Validate each axis against [-1,1]
    pub fn validate(&self) -> Result<()> {
        for (field, v) in [
            ("pad.pleasure", self.pleasure),
            ("pad.arousal", self.arousal),
            ("pad.dominance", self.dominance),
        ] {
            if !(-1.0..=1.0).contains(&v) {
                return Err(KatraError::OutOfRange { field });
            }
        }
        Ok(())
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// A Tier-1 memory record
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Stable identifier, unique within an agent (UUID v4)
    pub id: String,
    /// Owning agent identity
    pub ci_id: String,
    /// Optional session grouping
    pub session_id: Option<String>,
    /// Monotone counter within a session (end-of-turn reflection)
    pub turn_id: Option<u64>,
    /// Kind of memory
    pub memory_type: MemoryType,
    /// Free text, bounded by the record-size limit
    pub content: String,
    /// Preservation strength in [0,1]
    pub importance: f64,
    /// Optional reasoning; for decisions, carries the why
    pub importance_note: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Updated on query; drives the "warmth" signal
    pub last_accessed: Option<DateTime<Utc>>,
    /// Explicit consent: never archive or evict
    pub marked_important: bool,
    /// Explicit consent: archive at the next opportunity
    pub marked_forgettable: bool,
    /// Emotional intensity in [0,1]
    pub emotion_intensity: f64,
    /// Optional emotion label
    pub emotion_type: Option<String>,
    /// Optional PAD triple
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pad: Option<PadState>,
    /// Derived: connections / max observed. Never persisted authoritatively.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_centrality: Option<f64>,
    /// Derived: distinct neighbor count. Never persisted authoritatively.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_count: Option<usize>,
    /// Group tag; records sharing one belong to the same detected pattern
    pub pattern_id: Option<String>,
    /// Visibility level
    pub isolation: IsolationLevel,
    /// Required when isolation is Team
    pub team_name: Option<String>,
    /// Explicit share targets when isolation is Shared
    #[serde(default)]
    pub share_targets: Vec<String>,
    /// Counted against the working-memory budget when true
    pub session_scoped: bool,
}

impl MemoryRecord {
    /// Enforce the record invariants.
    ///
    /// `marked_important` dominating `marked_forgettable` is resolved here
    /// rather than rejected: a record carrying both flags keeps only the pin.
    pub fn validate(&mut self, max_content_len: usize) -> Result<()> {
        if self.ci_id.trim().is_empty() {
            return Err(KatraError::MissingInput("ci_id"));
        }
        if self.content.trim().is_empty() {
            return Err(KatraError::MissingInput("content"));
        }
        if self.content.len() > max_content_len {
            return Err(KatraError::InputTooLong {
                field: "content",
                max: max_content_len,
            });
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(KatraError::OutOfRange {
                field: "importance",
            });
        }
        if !(0.0..=1.0).contains(&self.emotion_intensity) {
            return Err(KatraError::OutOfRange {
                field: "emotion_intensity",
            });
        }
        if let Some(pad) = &self.pad {
            pad.validate()?;
        }
        if self.isolation == IsolationLevel::Team && self.team_name.is_none() {
            return Err(KatraError::MissingInput("team_name"));
        }
        if self.marked_important && self.marked_forgettable {
            self.marked_forgettable = false;
        }
        Ok(())
    }

    /// Importance level for display
    pub fn why_remember(&self) -> WhyRemember {
        WhyRemember::from_importance(self.importance)
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a new record.
///
/// Uses `deny_unknown_fields` to prevent field injection from tool callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateRecordInput {
    /// Owning agent identity
    pub ci_id: String,
    /// Free text to remember
    pub content: String,
    /// Kind of memory
    #[serde(default)]
    pub memory_type: MemoryType,
    /// Preservation strength in [0,1]
    #[serde(default = "default_importance")]
    pub importance: f64,
    /// Optional reasoning
    pub importance_note: Option<String>,
    /// Session grouping
    pub session_id: Option<String>,
    /// Turn counter within the session
    pub turn_id: Option<u64>,
    /// Emotional intensity in [0,1]
    #[serde(default)]
    pub emotion_intensity: f64,
    /// Optional emotion label
    pub emotion_type: Option<String>,
    /// Optional PAD triple
    pub pad: Option<PadState>,
    /// Visibility level
    #[serde(default)]
    pub isolation: IsolationLevel,
    /// Required when isolation is Team
    pub team_name: Option<String>,
    /// Explicit share targets
    #[serde(default)]
    pub share_targets: Vec<String>,
    /// Count against the working-memory budget
    #[serde(default)]
    pub session_scoped: bool,
}

fn default_importance() -> f64 {
    WhyRemember::Interesting.importance()
}

impl CreateRecordInput {
    /// Minimal input for the common path
    pub fn new(ci_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            ci_id: ci_id.into(),
            content: content.into(),
            memory_type: MemoryType::default(),
            importance: default_importance(),
            importance_note: None,
            session_id: None,
            turn_id: None,
            emotion_intensity: 0.0,
            emotion_type: None,
            pad: None,
            isolation: IsolationLevel::default(),
            team_name: None,
            share_targets: Vec::new(),
            session_scoped: false,
        }
    }

    /// Build a validated record with a fresh id and timestamps
    pub fn into_record(self, max_content_len: usize) -> Result<MemoryRecord> {
        let mut record = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            ci_id: self.ci_id,
            session_id: self.session_id,
            turn_id: self.turn_id,
            memory_type: self.memory_type,
            content: self.content,
            importance: self.importance,
            importance_note: self.importance_note,
            created_at: Utc::now(),
            last_accessed: None,
            marked_important: false,
            marked_forgettable: false,
            emotion_intensity: self.emotion_intensity,
            emotion_type: self.emotion_type,
            pad: self.pad,
            graph_centrality: None,
            connection_count: None,
            pattern_id: None,
            isolation: self.isolation,
            team_name: self.team_name,
            share_targets: self.share_targets,
            session_scoped: self.session_scoped,
        };
        record.validate(max_content_len)?;
        Ok(record)
    }
}

// ============================================================================
// QUERY FILTER
// ============================================================================

/// Filter for Tier-1 queries. `ci_id` is required; everything else narrows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    /// Owning agent (required)
    pub ci_id: String,
    /// Inclusive lower bound on created_at
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on created_at
    pub end_time: Option<DateTime<Utc>>,
    /// Restrict to one memory type
    pub memory_type: Option<MemoryType>,
    /// Drop records below this importance
    pub min_importance: Option<f64>,
    /// Restrict to session-scoped (true) or durable (false) records
    pub session_scoped: Option<bool>,
    /// Result cap
    pub limit: Option<usize>,
}

impl RecordFilter {
    /// Filter for everything one agent owns
    pub fn for_agent(ci_id: impl Into<String>) -> Self {
        Self {
            ci_id: ci_id.into(),
            ..Default::default()
        }
    }
}

/// Partial metadata mutation; at least one field must be provided
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    /// Make the record private to its owner
    pub personal: Option<bool>,
    /// Pin the record against archival
    pub not_to_archive: Option<bool>,
    /// Assign the record to a pattern collection
    pub collection: Option<String>,
}

impl MetadataUpdate {
    /// True when no field is set (invalid as an update)
    pub fn is_empty(&self) -> bool {
        self.personal.is_none() && self.not_to_archive.is_none() && self.collection.is_none()
    }
}

// ============================================================================
// TESTS
// ============================================================================
