//! "Why remember" phrase parsing
//!
//! Turns a free-text preservation hint ("this is critical", "not that
//! important") into a numeric importance and its level. Longer compound
//! phrases are scanned before shorter keywords so "very important" never
//! resolves as plain "important", and negations always down-rank.

use crate::record::types::WhyRemember;

/// Parsed importance: the numeric value and its level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedImportance {
    /// Numeric importance in [0,1]
    pub importance: f64,
    /// Bucketed level
    pub level: WhyRemember,
}

impl From<WhyRemember> for ParsedImportance {
    fn from(level: WhyRemember) -> Self {
        Self {
            importance: level.importance(),
            level,
        }
    }
}

/// Scan order matters: compounds before their component keywords.
const NEGATIONS: &[&str] = &[
    "not important",
    "not significant",
    "not critical",
    "unimportant",
    "doesn't matter",
    "does not matter",
    "forget this",
];

const VERY_COMPOUNDS: &[(&str, WhyRemember)] = &[
    ("very important", WhyRemember::Critical),
    ("very significant", WhyRemember::Critical),
    ("extremely important", WhyRemember::Critical),
    ("very interesting", WhyRemember::Significant),
    ("very useful", WhyRemember::Significant),
];

const HIGH: &[&str] = &["important", "significant", "essential", "must remember", "high"];
const MEDIUM: &[&str] = &["interesting", "useful", "notable", "worth remembering", "medium"];
const LOW: &[&str] = &["routine", "minor", "low", "ordinary"];
const TRIVIAL: &[&str] = &["trivial", "noise", "throwaway"];

/// Parse a "why remember" phrase into an importance.
///
/// Empty or unrecognized input resolves to the Interesting default.
pub fn parse_why_remember(phrase: &str) -> ParsedImportance {
    let lower = phrase.to_lowercase();

    // 1. "critical" outranks everything, including its own negation: an
    //    explicit critical marking is user consent.
    if lower.contains("critical") && !lower.contains("not critical") {
        return WhyRemember::Critical.into();
    }

    // 2. Negations down-rank before any positive keyword can match.
    if NEGATIONS.iter().any(|n| lower.contains(n)) {
        return WhyRemember::Trivial.into();
    }

    // 3. "very X" compounds before their bare keywords.
    for (compound, level) in VERY_COMPOUNDS {
        if lower.contains(compound) {
            return (*level).into();
        }
    }

    // 4. Plain keywords, strongest first.
    if HIGH.iter().any(|k| lower.contains(k)) {
        return WhyRemember::Significant.into();
    }
    if MEDIUM.iter().any(|k| lower.contains(k)) {
        return WhyRemember::Interesting.into();
    }
    if LOW.iter().any(|k| lower.contains(k)) {
        return WhyRemember::Routine.into();
    }
    if TRIVIAL.iter().any(|k| lower.contains(k)) {
        return WhyRemember::Trivial.into();
    }

    WhyRemember::Interesting.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_wins() {
        assert_eq!(parse_why_remember("this is critical").level, WhyRemember::Critical);
        assert_eq!(
            parse_why_remember("critical but also routine").level,
            WhyRemember::Critical
        );
    }

    #[test]
    fn test_negation_downranks() {
        assert_eq!(parse_why_remember("not important").level, WhyRemember::Trivial);
        assert_eq!(
            parse_why_remember("this is not important at all").level,
            WhyRemember::Trivial
        );
        assert_eq!(parse_why_remember("not critical").level, WhyRemember::Trivial);
    }

    #[test]
    fn test_compound_before_keyword() {
        // "very important" must not resolve as bare "important"
        assert_eq!(
            parse_why_remember("very important milestone").level,
            WhyRemember::Critical
        );
        assert_eq!(parse_why_remember("important milestone").level, WhyRemember::Significant);
        assert_eq!(parse_why_remember("very useful trick").level, WhyRemember::Significant);
    }

    #[test]
    fn test_levels() {
        assert_eq!(parse_why_remember("useful").level, WhyRemember::Interesting);
        assert_eq!(parse_why_remember("routine check-in").level, WhyRemember::Routine);
        assert_eq!(parse_why_remember("trivial detail").level, WhyRemember::Trivial);
    }

    #[test]
    fn test_default_is_interesting() {
        let parsed = parse_why_remember("");
        assert_eq!(parsed.level, WhyRemember::Interesting);
        assert!((parsed.importance - 0.5).abs() < f64::EPSILON);
    }
}
