//! Digest - the Tier-2 unit
//!
//! One immutable summary of a set of archived Tier-1 records over one
//! period. The JSONL wire format uses epoch-second timestamps and integer
//! discriminants for `period_type`/`digest_type`; serializers emit fields in
//! the documented order for diff-friendliness. A compact TOON rendering with
//! the same semantic fields exists for low-cost LLM context loading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::types::{DigestType, PeriodType};

// ============================================================================
// ENTITIES
// ============================================================================

/// Named entities mentioned by a digest's source records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestEntities {
    /// File-looking tokens (paths, extensions)
    #[serde(default)]
    pub files: Vec<String>,
    /// Domain concepts
    #[serde(default)]
    pub concepts: Vec<String>,
    /// People / agent names
    #[serde(default)]
    pub people: Vec<String>,
}

// ============================================================================
// DIGEST
// ============================================================================

/// An immutable Tier-2 digest.
///
/// Field order here is the documented wire order; serde emits in declaration
/// order, so do not reorder fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    /// Unique identifier (UUID v4)
    pub digest_id: String,
    /// Creation time as epoch seconds
    pub timestamp: i64,
    /// 0 = weekly, 1 = monthly
    #[serde(with = "period_type_wire")]
    pub period_type: PeriodType,
    /// Bucket id, e.g. "2025-W43" or "2025-10"
    pub period_id: String,
    /// Which tier the sources lived in (1 for Tier-1 archival)
    pub source_tier: u8,
    /// How many records were folded into this digest
    pub source_record_count: usize,
    /// Owning agent identity
    pub ci_id: String,
    /// 0=interaction, 1=learning, 2=project, 3=mixed
    #[serde(with = "digest_type_wire")]
    pub digest_type: DigestType,
    /// Dominant themes
    pub themes: Vec<String>,
    /// Searchable keywords
    pub keywords: Vec<String>,
    /// Named entities
    pub entities: DigestEntities,
    /// Prose summary of the period
    pub summary: String,
    /// Key insights worth keeping verbatim
    pub key_insights: Vec<String>,
    /// How many of the sources were questions
    pub questions_asked: usize,
    /// Decisions captured during the period
    pub decisions_made: Vec<String>,
    /// Soft-delete flag; the only mutable field after write
    pub archived: bool,
}

impl Digest {
    /// New empty digest shell for one agent and period
    pub fn new(ci_id: impl Into<String>, period_type: PeriodType, period_id: impl Into<String>) -> Self {
        Self {
            digest_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp(),
            period_type,
            period_id: period_id.into(),
            source_tier: 1,
            source_record_count: 0,
            ci_id: ci_id.into(),
            digest_type: DigestType::Mixed,
            themes: Vec::new(),
            keywords: Vec::new(),
            entities: DigestEntities::default(),
            summary: String::new(),
            key_insights: Vec::new(),
            questions_asked: 0,
            decisions_made: Vec::new(),
            archived: false,
        }
    }

    /// Creation time as a chrono timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_else(Utc::now)
    }

    /// One JSONL wire line (no trailing newline)
    pub fn to_wire_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse one JSONL wire line
    pub fn from_wire_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Compact token-oriented rendering with the same semantic fields.
    ///
    /// One `key: value` line per field; arrays join with commas. Meant for
    /// cheap LLM context loading, not for round-tripping.
    pub fn to_toon(&self) -> String {
        let mut out = String::with_capacity(self.summary.len() + 256);
        let mut push = |k: &str, v: String| {
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&v);
            out.push('\n');
        };
        push("digest", self.digest_id.clone());
        push("when", self.created_at().format("%Y-%m-%d").to_string());
        push(
            "period",
            format!("{} {}", self.period_type.dir_name(), self.period_id),
        );
        push("ci", self.ci_id.clone());
        push("sources", self.source_record_count.to_string());
        push("themes", self.themes.join(", "));
        push("keywords", self.keywords.join(", "));
        if !self.entities.files.is_empty() {
            push("files", self.entities.files.join(", "));
        }
        if !self.entities.people.is_empty() {
            push("people", self.entities.people.join(", "));
        }
        push("summary", self.summary.clone());
        for insight in &self.key_insights {
            push("insight", insight.clone());
        }
        for decision in &self.decisions_made {
            push("decision", decision.clone());
        }
        out
    }
}

// Wire encodings for the integer discriminants

mod period_type_wire {
    use super::PeriodType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &PeriodType, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(v.wire())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PeriodType, D::Error> {
        Ok(PeriodType::from_wire(u8::deserialize(d)?))
    }
}

mod digest_type_wire {
    use super::DigestType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &DigestType, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(v.wire())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DigestType, D::Error> {
        Ok(DigestType::from_wire(u8::deserialize(d)?))
    }
}

// ============================================================================
// PERIOD ID HELPERS
// ============================================================================

/// Bucket id for a timestamp under a period type.
///
/// Weekly ids use the ISO week ("2025-W43"); monthly ids the calendar month
/// ("2025-10").
pub fn period_id_for(period_type: PeriodType, at: DateTime<Utc>) -> String {
    use chrono::Datelike;
    match period_type {
        PeriodType::Weekly => {
            let week = at.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        PeriodType::Monthly => format!("{}-{:02}", at.year(), at.month()),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Digest {
        let mut d = Digest::new("alice", PeriodType::Weekly, "2025-W43");
        d.source_record_count = 12;
        d.digest_type = DigestType::Learning;
        d.themes = vec!["deploys".into(), "testing".into()];
        d.keywords = vec!["staging".into(), "rollback".into()];
        d.entities.files = vec!["deploy.rs".into()];
        d.entities.people = vec!["Casey".into()];
        d.summary = "A week of deploy hardening.".into();
        d.key_insights = vec!["canary first".into()];
        d.questions_asked = 2;
        d.decisions_made = vec!["adopt canary deploys".into()];
        d
    }

    #[test]
    fn test_wire_roundtrip_preserves_all_fields() {
        let d = sample();
        let line = d.to_wire_line().unwrap();
        let back = Digest::from_wire_line(&line).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_wire_uses_integer_discriminants() {
        let d = sample();
        let value: serde_json::Value = serde_json::from_str(&d.to_wire_line().unwrap()).unwrap();
        assert_eq!(value["period_type"], 0);
        assert_eq!(value["digest_type"], 1);
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_wire_field_order_is_documented_order() {
        let d = sample();
        let line = d.to_wire_line().unwrap();
        let digest_pos = line.find("\"digest_id\"").unwrap();
        let ts_pos = line.find("\"timestamp\"").unwrap();
        let archived_pos = line.find("\"archived\"").unwrap();
        assert!(digest_pos < ts_pos);
        assert!(ts_pos < archived_pos);
    }

    #[test]
    fn test_period_ids() {
        let at = Utc.with_ymd_and_hms(2025, 10, 22, 12, 0, 0).unwrap();
        assert_eq!(period_id_for(PeriodType::Weekly, at), "2025-W43");
        assert_eq!(period_id_for(PeriodType::Monthly, at), "2025-10");
    }

    #[test]
    fn test_toon_carries_semantic_fields() {
        let toon = sample().to_toon();
        assert!(toon.contains("themes: deploys, testing"));
        assert!(toon.contains("summary: A week of deploy hardening."));
        assert!(toon.contains("decision: adopt canary deploys"));
    }
}
