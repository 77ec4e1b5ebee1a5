//! Record module - core types of the memory model
//!
//! Typed records (the Tier-1 unit), digests (the Tier-2 unit), the
//! importance model, and the enums shared across the engine.

mod digest;
mod importance;
mod record;
mod types;

pub use digest::{period_id_for, Digest, DigestEntities};
pub use importance::{parse_why_remember, ParsedImportance};
pub use record::{CreateRecordInput, MemoryRecord, MetadataUpdate, PadState, RecordFilter};
pub use types::{
    AgentStatus, DigestType, HealthStatus, IsolationLevel, MemoryType, PeriodType, WhyRemember,
};
