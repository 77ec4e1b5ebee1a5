//! Summarizer collaborator
//!
//! The archival path hands a batch of Tier-1 records to a [`Summarizer`]
//! and gets back the digest fields. The contract is deterministic and
//! purely functional: the same records always produce equivalent output.
//! [`ExtractiveSummarizer`] is the built-in implementation; hosts with an
//! LLM can inject their own.

use std::collections::HashMap;

use crate::record::{DigestEntities, DigestType, MemoryRecord, MemoryType};
use crate::vector::tokenize;

/// Digest fields produced from a record batch
#[derive(Debug, Clone, Default)]
pub struct DigestDraft {
    /// Topical classification
    pub digest_type: DigestType,
    /// Dominant themes
    pub themes: Vec<String>,
    /// Searchable keywords
    pub keywords: Vec<String>,
    /// Named entities
    pub entities: DigestEntities,
    /// Prose summary; carries the source contents so archived material
    /// stays recoverable from the digest
    pub summary: String,
    /// Verbatim insights worth keeping
    pub key_insights: Vec<String>,
    /// Source records that were questions
    pub questions_asked: usize,
    /// Decisions captured during the period
    pub decisions_made: Vec<String>,
}

/// Turns a set of Tier-1 records into digest fields.
///
/// Implementations must be deterministic: same inputs, equivalent outputs.
pub trait Summarizer: Send + Sync {
    /// Summarize one archival batch
    fn summarize(&self, records: &[MemoryRecord]) -> DigestDraft;
}

// ============================================================================
// EXTRACTIVE SUMMARIZER
// ============================================================================

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "to", "of", "in", "on", "and", "or", "is", "was", "for", "with", "that",
    "this", "it", "at", "by", "be", "as", "are", "we", "i", "my", "our",
];

/// How many keywords a digest carries
const MAX_KEYWORDS: usize = 8;
/// How many of those become themes
const MAX_THEMES: usize = 3;
/// Per-record content cap inside the recovery tail
const RECOVERY_SNIPPET_LEN: usize = 200;

/// Deterministic term-frequency summarizer
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    fn top_terms(records: &[MemoryRecord]) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in records {
            for term in tokenize(&record.content) {
                if STOPWORDS.contains(&term.as_str()) {
                    continue;
                }
                *counts.entry(term).or_insert(0) += 1;
            }
        }
        let mut terms: Vec<(String, usize)> = counts.into_iter().collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.into_iter().take(MAX_KEYWORDS).map(|(t, _)| t).collect()
    }

    fn extract_entities(records: &[MemoryRecord]) -> DigestEntities {
        let mut entities = DigestEntities::default();
        for record in records {
            for (i, token) in record.content.split_whitespace().enumerate() {
                let clean = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '.' && c != '/');
                if clean.len() < 3 {
                    continue;
                }
                // Path-shaped or extension-carrying tokens read as files
                let looks_like_file = clean.contains('/')
                    || (clean.contains('.') && !clean.ends_with('.') && !clean.starts_with('.'));
                if looks_like_file {
                    if !entities.files.contains(&clean.to_string()) {
                        entities.files.push(clean.to_string());
                    }
                    continue;
                }
                // Mid-sentence capitalized words read as people
                let is_capitalized = clean.chars().next().is_some_and(|c| c.is_uppercase())
                    && clean.chars().skip(1).all(|c| c.is_lowercase());
                if i > 0 && is_capitalized && !entities.people.contains(&clean.to_string()) {
                    entities.people.push(clean.to_string());
                }
            }
        }
        entities.files.sort();
        entities.people.sort();
        entities
    }

    fn classify(records: &[MemoryRecord]) -> DigestType {
        let mut learning = 0usize;
        let mut interaction = 0usize;
        let mut project = 0usize;
        for record in records {
            match record.memory_type {
                MemoryType::Knowledge | MemoryType::Reflection => learning += 1,
                MemoryType::Experience | MemoryType::Decision => interaction += 1,
                MemoryType::Pattern => project += 1,
            }
        }
        let total = records.len().max(1);
        if learning * 10 > total * 6 {
            DigestType::Learning
        } else if interaction * 10 > total * 6 {
            DigestType::Interaction
        } else if project * 10 > total * 6 {
            DigestType::Project
        } else {
            DigestType::Mixed
        }
    }
}

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, records: &[MemoryRecord]) -> DigestDraft {
        let keywords = Self::top_terms(records);
        let themes: Vec<String> = keywords.iter().take(MAX_THEMES).cloned().collect();
        let entities = Self::extract_entities(records);

        let questions_asked = records.iter().filter(|r| r.content.contains('?')).count();

        let mut decisions_made = Vec::new();
        for record in records {
            if record.memory_type == MemoryType::Decision {
                let mut decision = record.content.clone();
                if let Some(note) = &record.importance_note {
                    decision.push_str(" (");
                    decision.push_str(note);
                    decision.push(')');
                }
                decisions_made.push(decision);
            }
        }

        let mut key_insights: Vec<String> = records
            .iter()
            .filter(|r| r.importance >= 0.6 && r.memory_type != MemoryType::Decision)
            .map(|r| r.content.clone())
            .collect();
        key_insights.sort();

        // Headline plus the recovery tail: every source content, clipped,
        // in creation order
        let mut ordered: Vec<&MemoryRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let mut summary = format!(
            "{} records; themes: {}.",
            records.len(),
            if themes.is_empty() {
                "none".to_string()
            } else {
                themes.join(", ")
            }
        );
        for record in &ordered {
            summary.push_str(" | ");
            let mut snippet = record.content.as_str();
            if snippet.len() > RECOVERY_SNIPPET_LEN {
                let mut cut = RECOVERY_SNIPPET_LEN;
                while !snippet.is_char_boundary(cut) {
                    cut -= 1;
                }
                snippet = &snippet[..cut];
            }
            summary.push_str(snippet);
        }

        DigestDraft {
            digest_type: Self::classify(records),
            themes,
            keywords,
            entities,
            summary,
            key_insights,
            questions_asked,
            decisions_made,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CreateRecordInput;

    fn record(content: &str, memory_type: MemoryType, importance: f64) -> MemoryRecord {
        let mut input = CreateRecordInput::new("alice", content);
        input.memory_type = memory_type;
        input.importance = importance;
        input.into_record(4096).unwrap()
    }

    #[test]
    fn test_summarize_is_deterministic() {
        let records = vec![
            record("deployed v1 to staging", MemoryType::Experience, 0.5),
            record("deployed v1 to prod", MemoryType::Experience, 0.5),
        ];
        let a = ExtractiveSummarizer.summarize(&records);
        let b = ExtractiveSummarizer.summarize(&records);
        assert_eq!(a.keywords, b.keywords);
        assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn test_keywords_skip_stopwords() {
        let records = vec![record(
            "the deploy of the build to the cluster",
            MemoryType::Experience,
            0.5,
        )];
        let draft = ExtractiveSummarizer.summarize(&records);
        assert!(!draft.keywords.iter().any(|k| k == "the"));
        assert!(draft.keywords.iter().any(|k| k == "deploy"));
    }

    #[test]
    fn test_decisions_carry_their_notes() {
        let mut input = CreateRecordInput::new("alice", "adopt canary deploys");
        input.memory_type = MemoryType::Decision;
        input.importance_note = Some("staging caught two regressions".into());
        let records = vec![input.into_record(4096).unwrap()];

        let draft = ExtractiveSummarizer.summarize(&records);
        assert_eq!(draft.decisions_made.len(), 1);
        assert!(draft.decisions_made[0].contains("staging caught"));
    }

    #[test]
    fn test_summary_recovers_source_content() {
        let records = vec![
            record("first thing that happened", MemoryType::Experience, 0.3),
            record("second thing that happened", MemoryType::Experience, 0.3),
        ];
        let draft = ExtractiveSummarizer.summarize(&records);
        assert!(draft.summary.contains("first thing that happened"));
        assert!(draft.summary.contains("second thing that happened"));
    }

    #[test]
    fn test_classification() {
        let learning: Vec<MemoryRecord> = (0..5)
            .map(|i| record(&format!("fact {i}"), MemoryType::Knowledge, 0.5))
            .collect();
        assert_eq!(
            ExtractiveSummarizer.summarize(&learning).digest_type,
            DigestType::Learning
        );

        let mixed = vec![
            record("fact", MemoryType::Knowledge, 0.5),
            record("event", MemoryType::Experience, 0.5),
        ];
        assert_eq!(
            ExtractiveSummarizer.summarize(&mixed).digest_type,
            DigestType::Mixed
        );
    }

    #[test]
    fn test_entities() {
        let records = vec![record(
            "reviewed src/deploy.rs with Casey yesterday",
            MemoryType::Experience,
            0.5,
        )];
        let draft = ExtractiveSummarizer.summarize(&records);
        assert!(draft.entities.files.iter().any(|f| f.contains("deploy.rs")));
        assert!(draft.entities.people.contains(&"Casey".to_string()));
    }

    #[test]
    fn test_questions_counted() {
        let records = vec![
            record("why did the build fail?", MemoryType::Experience, 0.5),
            record("build fixed", MemoryType::Experience, 0.5),
        ];
        assert_eq!(ExtractiveSummarizer.summarize(&records).questions_asked, 1);
    }
}
