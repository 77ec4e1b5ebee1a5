//! # Katra Core
//!
//! Persistent memory substrate for long-running conversational agents:
//!
//! - **Tier 1**: hot record store — typed records, dedup, mutation, expiry,
//!   backed by a JSONL write-ahead journal plus a SQLite index
//! - **Tier 2**: cold digest store — content summaries of archived material
//!   in weekly/monthly JSONL buckets with a secondary index
//! - **Hybrid recall**: keyword + vector similarity with max-score fusion
//!   and graph-walk context expansion
//! - **Association graph**: SIMILAR/SEQUENTIAL edges wired automatically at
//!   write time; centrality derived on demand
//! - **Working-memory budget**: soft/hard caps with archive-then-delete
//!   eviction over session-scoped records
//! - **Message bus**: broadcast history with TTL, per-recipient FIFO
//!   queues, and an agent registry with heartbeat
//! - **Maintenance loop**: periodic consolidation, flushing, hygiene, and
//!   cleanup with health reporting
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use katra_core::{CreateRecordInput, Katra, KatraConfig, RecordFilter};
//!
//! let engine = Katra::open(home_dir, KatraConfig::default())?;
//!
//! // Remember a typed thought
//! let record = engine.remember(CreateRecordInput::new("alice", "deployed v1 to staging"))?;
//!
//! // Hybrid recall
//! let hits = engine.recall_about("alice", "deploys")?;
//!
//! // Talk to other agents
//! engine.bus().register("ci-alice", "alice", Some("build lead"))?;
//! engine.bus().say("alice", "release is out", Some("broadcast"))?;
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod budget;
pub mod bus;
pub mod config;
pub mod consolidation;
pub mod engine;
pub mod error;
pub mod graph;
pub mod maintenance;
pub mod record;
pub mod search;
pub mod tier1;
pub mod tier2;
pub mod vector;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Engine handle
pub use engine::{Katra, MemoryOverview};

// Errors
pub use error::{KatraError, Result};

// Configuration
pub use config::{ArchivalConfig, BudgetConfig, BusConfig, KatraConfig};

// Record model
pub use record::{
    parse_why_remember, period_id_for, AgentStatus, CreateRecordInput, Digest, DigestEntities,
    DigestType, HealthStatus, IsolationLevel, MemoryRecord, MemoryType, MetadataUpdate, PadState,
    ParsedImportance, PeriodType, RecordFilter, WhyRemember,
};

// Tier-1 store
pub use tier1::{StoreOutcome, Tier1Stats, Tier1Store};

// Tier-2 digest store
pub use tier2::{DigestFilter, DigestStore};

// Vector index
pub use vector::{cosine_similarity, EmbeddingScheme, VectorStore, DIMENSIONS};

// Graph index
pub use graph::{EdgeLabel, GraphEdge, GraphStore, HubRecord};

// Retrieval
pub use search::{fuse, HybridSearchConfig, SearchHit, KEYWORD_SCORE};

// Consolidation
pub use consolidation::{
    ArchivalDecision, ArchivalPolicy, ArchiveReport, Archiver, DigestDraft, ExtractiveSummarizer,
    Summarizer,
};

// Working-memory budget
pub use budget::{BudgetAction, WorkingMemoryBudget};

// Message bus
pub use bus::{
    BroadcastMessage, BusCleanup, HearResult, MessageBus, QueueEntry, RegistryEntry, SayReceipt,
};

// Maintenance
pub use maintenance::{compute_health, HealthReport, MaintenanceReport};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CreateRecordInput, Digest, DigestFilter, HealthStatus, Katra, KatraConfig, KatraError,
        MemoryRecord, MemoryType, MessageBus, RecordFilter, Result, SearchHit, WhyRemember,
    };
}
