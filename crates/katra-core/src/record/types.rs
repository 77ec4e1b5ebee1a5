//! Typed enums of the record model
//!
//! Integer discriminants appear only on the digest wire; everywhere else
//! these serialize as lowercase strings. Wire strings for agent status and
//! health status are part of the external contract and must not change.

use serde::{Deserialize, Serialize};

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Kind of memory a record holds
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Something that happened during a session
    #[default]
    Experience,
    /// End-of-turn or end-of-session introspection
    Reflection,
    /// A fact or learned piece of information
    Knowledge,
    /// A decision, with its reasoning in the importance note
    Decision,
    /// A member of a detected recurring pattern
    Pattern,
}

impl MemoryType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Experience => "experience",
            MemoryType::Reflection => "reflection",
            MemoryType::Knowledge => "knowledge",
            MemoryType::Decision => "decision",
            MemoryType::Pattern => "pattern",
        }
    }

    /// Parse from string name; unknown names fall back to Experience
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "experience" => MemoryType::Experience,
            "reflection" => MemoryType::Reflection,
            "knowledge" => MemoryType::Knowledge,
            "decision" => MemoryType::Decision,
            "pattern" => MemoryType::Pattern,
            _ => MemoryType::Experience,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// IMPORTANCE ("WHY REMEMBER")
// ============================================================================

/// Five-level ordinal of how strongly a memory should be preserved
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WhyRemember {
    /// Noise; first to go
    Trivial,
    /// Ordinary operational detail
    Routine,
    /// Worth keeping around
    #[default]
    Interesting,
    /// Shapes future behavior
    Significant,
    /// Never let go without explicit consent
    Critical,
}

impl WhyRemember {
    /// Numeric importance in [0,1] for this level
    pub fn importance(&self) -> f64 {
        match self {
            WhyRemember::Trivial => 0.1,
            WhyRemember::Routine => 0.3,
            WhyRemember::Interesting => 0.5,
            WhyRemember::Significant => 0.75,
            WhyRemember::Critical => 1.0,
        }
    }

    /// Bucket a numeric importance back into a level
    pub fn from_importance(importance: f64) -> Self {
        if importance < 0.2 {
            WhyRemember::Trivial
        } else if importance < 0.4 {
            WhyRemember::Routine
        } else if importance < 0.6 {
            WhyRemember::Interesting
        } else if importance < 0.85 {
            WhyRemember::Significant
        } else {
            WhyRemember::Critical
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            WhyRemember::Trivial => "trivial",
            WhyRemember::Routine => "routine",
            WhyRemember::Interesting => "interesting",
            WhyRemember::Significant => "significant",
            WhyRemember::Critical => "critical",
        }
    }
}

impl std::fmt::Display for WhyRemember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ISOLATION
// ============================================================================

/// Who may see a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    /// Owner only
    #[default]
    Private,
    /// Visible to a named team
    Team,
    /// Visible to explicit share targets
    Shared,
}

impl IsolationLevel {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::Private => "private",
            IsolationLevel::Team => "team",
            IsolationLevel::Shared => "shared",
        }
    }

    /// Parse from string name; unknown names fall back to Private
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "team" => IsolationLevel::Team,
            "shared" => IsolationLevel::Shared,
            _ => IsolationLevel::Private,
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// DIGEST PERIODS AND TYPES
// ============================================================================

/// Time bucket granularity for Tier-2 digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// ISO-week buckets ("2025-W43")
    #[default]
    Weekly,
    /// Calendar-month buckets ("2025-10")
    Monthly,
}

impl PeriodType {
    /// Wire discriminant (digest JSONL format)
    pub fn wire(&self) -> u8 {
        match self {
            PeriodType::Weekly => 0,
            PeriodType::Monthly => 1,
        }
    }

    /// Parse from wire discriminant
    pub fn from_wire(v: u8) -> Self {
        match v {
            1 => PeriodType::Monthly,
            _ => PeriodType::Weekly,
        }
    }

    /// Bucket directory name
    pub fn dir_name(&self) -> &'static str {
        match self {
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        }
    }
}

/// Topical classification of a digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DigestType {
    /// Conversation and collaboration material
    Interaction,
    /// Knowledge and reflection material
    Learning,
    /// Project-focused material
    Project,
    /// Anything else
    #[default]
    Mixed,
}

impl DigestType {
    /// Wire discriminant (digest JSONL format)
    pub fn wire(&self) -> u8 {
        match self {
            DigestType::Interaction => 0,
            DigestType::Learning => 1,
            DigestType::Project => 2,
            DigestType::Mixed => 3,
        }
    }

    /// Parse from wire discriminant
    pub fn from_wire(v: u8) -> Self {
        match v {
            0 => DigestType::Interaction,
            1 => DigestType::Learning,
            2 => DigestType::Project,
            _ => DigestType::Mixed,
        }
    }
}

// ============================================================================
// AGENT STATUS (registry wire strings)
// ============================================================================

/// Presence status of a registered agent.
///
/// The snake_case wire strings are part of the external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Reachable and listening
    #[default]
    Available,
    /// Registered but not actively listening
    Away,
    /// Working; expect slow replies
    Busy,
    /// Deliver nothing non-urgent
    DoNotDisturb,
}

impl AgentStatus {
    /// Wire string ("available"/"away"/"busy"/"do_not_disturb")
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Available => "available",
            AgentStatus::Away => "away",
            AgentStatus::Busy => "busy",
            AgentStatus::DoNotDisturb => "do_not_disturb",
        }
    }

    /// Parse from wire string; unknown values fall back to Available
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "away" => AgentStatus::Away,
            "busy" => AgentStatus::Busy,
            "do_not_disturb" | "dnd" => AgentStatus::DoNotDisturb,
            _ => AgentStatus::Available,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// HEALTH STATUS (maintenance wire strings)
// ============================================================================

/// Tier-1 pressure tier.
///
/// The wire strings "healthy"/"degraded"/"critical" are part of the external
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Below the soft limit
    Healthy,
    /// Between soft and hard limits
    Degraded,
    /// At or above the hard limit; low-importance writes refused
    Critical,
}

impl HealthStatus {
    /// Wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_roundtrip() {
        for mt in [
            MemoryType::Experience,
            MemoryType::Reflection,
            MemoryType::Knowledge,
            MemoryType::Decision,
            MemoryType::Pattern,
        ] {
            assert_eq!(MemoryType::parse_name(mt.as_str()), mt);
        }
    }

    #[test]
    fn test_importance_mapping_roundtrips() {
        for level in [
            WhyRemember::Trivial,
            WhyRemember::Routine,
            WhyRemember::Interesting,
            WhyRemember::Significant,
            WhyRemember::Critical,
        ] {
            assert_eq!(WhyRemember::from_importance(level.importance()), level);
        }
    }

    #[test]
    fn test_importance_ordering() {
        assert!(WhyRemember::Trivial < WhyRemember::Critical);
        assert!(WhyRemember::Interesting < WhyRemember::Significant);
    }

    #[test]
    fn test_period_wire_discriminants() {
        assert_eq!(PeriodType::Weekly.wire(), 0);
        assert_eq!(PeriodType::Monthly.wire(), 1);
        assert_eq!(PeriodType::from_wire(1), PeriodType::Monthly);
        assert_eq!(DigestType::from_wire(2), DigestType::Project);
        assert_eq!(DigestType::from_wire(9), DigestType::Mixed);
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(AgentStatus::DoNotDisturb.as_str(), "do_not_disturb");
        assert_eq!(
            AgentStatus::parse_name("do_not_disturb"),
            AgentStatus::DoNotDisturb
        );
        assert_eq!(HealthStatus::Degraded.as_str(), "degraded");
    }
}
