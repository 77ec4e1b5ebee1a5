//! Embedding schemes
//!
//! Three ways to turn content into a fixed-dimension dense vector: hash
//! (cheap, lossy), TF-IDF (default, needs corpus statistics), external
//! (caller-provided). Term slots come from FNV-1a, not the std hasher, so
//! identical content embeds identically across processes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Fixed dimensionality of every scheme
pub const DIMENSIONS: usize = 256;

/// How embeddings are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingScheme {
    /// Term-count buckets; no corpus statistics
    Hash,
    /// Term-frequency x inverse-document-frequency buckets
    #[default]
    TfIdf,
    /// Caller supplies the vectors
    External,
}

impl EmbeddingScheme {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingScheme::Hash => "hash",
            EmbeddingScheme::TfIdf => "tfidf",
            EmbeddingScheme::External => "external",
        }
    }

    /// Parse from string name; unknown names fall back to TfIdf
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hash" => EmbeddingScheme::Hash,
            "external" => EmbeddingScheme::External,
            _ => EmbeddingScheme::TfIdf,
        }
    }
}

/// FNV-1a 64-bit. Deterministic across processes, unlike RandomState.
fn fnv1a(term: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in term.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn term_slot(term: &str) -> usize {
    (fnv1a(term) % DIMENSIONS as u64) as usize
}

/// Lowercased alphanumeric terms of a text
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

// ============================================================================
// CORPUS STATISTICS
// ============================================================================

/// Document-frequency table for TF-IDF.
///
/// Updated only while indexing; query-mode embedding reads it without
/// writing, and the second regeneration pass freezes it entirely.
#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    /// Documents indexed so far
    pub doc_count: u64,
    /// Documents containing each term
    pub doc_freq: HashMap<String, u64>,
}

impl CorpusStats {
    /// Count one document's distinct terms into the table
    pub fn add_document(&mut self, terms: &[String]) {
        self.doc_count += 1;
        let mut seen: Vec<&String> = Vec::new();
        for term in terms {
            if !seen.contains(&term) {
                seen.push(term);
                *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }
    }

    /// Smoothed inverse document frequency
    pub fn idf(&self, term: &str) -> f64 {
        let df = self.doc_freq.get(term).copied().unwrap_or(0);
        (1.0 + self.doc_count as f64 / (1.0 + df as f64)).ln()
    }
}

// ============================================================================
// EMBEDDING
// ============================================================================

/// Embed content under a scheme. TF-IDF consults `stats`; hash ignores it.
pub fn embed(scheme: EmbeddingScheme, content: &str, stats: &CorpusStats) -> Vec<f32> {
    let terms = tokenize(content);
    let mut vector = vec![0.0f32; DIMENSIONS];
    if terms.is_empty() {
        return vector;
    }

    match scheme {
        EmbeddingScheme::Hash => {
            for term in &terms {
                vector[term_slot(term)] += 1.0;
            }
        }
        EmbeddingScheme::TfIdf | EmbeddingScheme::External => {
            // External vectors never pass through here, but a caller that
            // forgot store_external still gets a usable TF-IDF fallback.
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for term in &terms {
                *counts.entry(term.as_str()).or_insert(0) += 1;
            }
            let total = terms.len() as f64;
            for (term, count) in counts {
                let tf = count as f64 / total;
                vector[term_slot(term)] += (tf * stats.idf(term)) as f32;
            }
        }
    }

    normalize(&mut vector);
    vector
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity clamped into [0,1]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Serialize a vector as f32 little-endian bytes
pub fn to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Deserialize f32 little-endian bytes; None on a torn blob
pub fn from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_punctuation_and_single_chars() {
        let terms = tokenize("Deployed v1 to staging, again!");
        assert_eq!(terms, vec!["deployed", "v1", "to", "staging", "again"]);
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let mut stats = CorpusStats::default();
        stats.add_document(&tokenize("deployed v1 to staging"));
        stats.add_document(&tokenize("lunch with casey"));

        let a = embed(EmbeddingScheme::TfIdf, "deployed v1", &stats);
        let b = embed(EmbeddingScheme::TfIdf, "deployed v1", &stats);
        assert_eq!(a, b);

        let h1 = embed(EmbeddingScheme::Hash, "deployed v1", &stats);
        let h2 = embed(EmbeddingScheme::Hash, "deployed v1", &stats);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_similar_content_scores_high() {
        let mut stats = CorpusStats::default();
        for doc in ["deployed v1 to staging", "deployed v1 to prod", "lunch with casey"] {
            stats.add_document(&tokenize(doc));
        }

        let staging = embed(EmbeddingScheme::TfIdf, "deployed v1 to staging", &stats);
        let prod = embed(EmbeddingScheme::TfIdf, "deployed v1 to prod", &stats);
        let lunch = embed(EmbeddingScheme::TfIdf, "lunch with casey", &stats);

        let deploy_pair = cosine_similarity(&staging, &prod);
        let cross = cosine_similarity(&staging, &lunch);
        assert!(deploy_pair > cross);
        assert!(deploy_pair > 0.3);
    }

    #[test]
    fn test_cosine_bounds() {
        let a = vec![1.0f32, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.75];
        assert_eq!(from_bytes(&to_bytes(&v)).unwrap(), v);
        assert!(from_bytes(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_idf_favors_rare_terms() {
        let mut stats = CorpusStats::default();
        for _ in 0..10 {
            stats.add_document(&tokenize("common words here"));
        }
        stats.add_document(&tokenize("rare canary"));
        assert!(stats.idf("canary") > stats.idf("common"));
    }

    #[test]
    fn test_empty_content_embeds_to_zero() {
        let stats = CorpusStats::default();
        let v = embed(EmbeddingScheme::TfIdf, "!!!", &stats);
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
