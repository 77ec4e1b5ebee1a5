//! Vector index
//!
//! Maps record ids to dense embeddings, persisted as BLOBs in the Tier-1
//! index database and served from an in-memory map behind its own lock.
//! TF-IDF corpus statistics update only while indexing; the two-pass
//! `regenerate_all` freezes them in the second pass to prevent feedback.

mod embedding;

pub use embedding::{
    cosine_similarity, embed, from_bytes, to_bytes, tokenize, CorpusStats, EmbeddingScheme,
    DIMENSIONS,
};

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::{SecondsFormat, Utc};
use lru::LruCache;
use rusqlite::{params, Connection};

use crate::error::{KatraError, Result};
use crate::tier1::Tier1Store;

/// Query-embedding cache capacity
const QUERY_CACHE_SIZE: usize = 100;

#[derive(Clone)]
struct StoredVector {
    ci_id: String,
    vector: Vec<f32>,
}

/// Vector index statistics
#[derive(Debug, Clone)]
pub struct VectorStoreStats {
    /// Vectors held in memory
    pub total_vectors: usize,
    /// Active scheme
    pub scheme: EmbeddingScheme,
    /// Corpus documents counted into the TF-IDF stats
    pub corpus_docs: u64,
}

// ============================================================================
// VECTOR STORE
// ============================================================================

/// Per-process vector index with write-through persistence
pub struct VectorStore {
    conn: Mutex<Connection>,
    scheme: EmbeddingScheme,
    vectors: RwLock<HashMap<String, StoredVector>>,
    stats: RwLock<CorpusStats>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl VectorStore {
    /// Open against the Tier-1 index database (schema already applied)
    pub fn open(index_path: &Path, scheme: EmbeddingScheme) -> Result<Self> {
        let conn = Connection::open(index_path)?;
        Tier1Store::configure_connection(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            scheme,
            vectors: RwLock::new(HashMap::new()),
            stats: RwLock::new(CorpusStats::default()),
            // SAFETY: QUERY_CACHE_SIZE is a non-zero constant
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        };
        store.load()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KatraError::LockPoisoned("vector store"))
    }

    /// Active scheme
    pub fn scheme(&self) -> EmbeddingScheme {
        self.scheme
    }

    /// Load persisted embeddings and corpus stats into memory
    fn load(&self) -> Result<()> {
        let conn = self.conn()?;

        let mut map = HashMap::new();
        {
            let mut stmt = conn.prepare("SELECT record_id, ci_id, vector FROM embeddings")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?;
            for row in rows {
                let (record_id, ci_id, blob) = row?;
                match from_bytes(&blob) {
                    Some(vector) => {
                        map.insert(record_id, StoredVector { ci_id, vector });
                    }
                    None => tracing::warn!("Dropping torn embedding blob for {}", record_id),
                }
            }
        }

        let mut stats = CorpusStats::default();
        stats.doc_count = conn
            .query_row(
                "SELECT value FROM embedding_meta WHERE key = 'doc_count'",
                [],
                |row| row.get::<_, String>(0),
            )
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        {
            let mut stmt = conn.prepare("SELECT term, doc_freq FROM embedding_stats")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                let (term, df) = row?;
                stats.doc_freq.insert(term, df);
            }
        }
        drop(conn);

        *self
            .vectors
            .write()
            .map_err(|_| KatraError::LockPoisoned("vector map"))? = map;
        *self
            .stats
            .write()
            .map_err(|_| KatraError::LockPoisoned("corpus stats"))? = stats;
        Ok(())
    }

    // ========================================================================
    // INDEXING
    // ========================================================================

    /// Index one record's content under the current scheme.
    ///
    /// TF-IDF mode counts the document into the corpus statistics first,
    /// then embeds with the updated table.
    pub fn store(&self, record_id: &str, ci_id: &str, content: &str) -> Result<()> {
        if self.scheme == EmbeddingScheme::TfIdf {
            let terms = tokenize(content);
            {
                let mut stats = self
                    .stats
                    .write()
                    .map_err(|_| KatraError::LockPoisoned("corpus stats"))?;
                stats.add_document(&terms);
            }
            self.persist_stats_for(&terms)?;
            // Cached query embeddings are stale once the stats move
            if let Ok(mut cache) = self.query_cache.lock() {
                cache.clear();
            }
        }

        let vector = {
            let stats = self
                .stats
                .read()
                .map_err(|_| KatraError::LockPoisoned("corpus stats"))?;
            embed(self.scheme, content, &stats)
        };
        self.put_vector(record_id, ci_id, vector)
    }

    /// Index a caller-provided vector (External scheme)
    pub fn store_external(&self, record_id: &str, ci_id: &str, vector: Vec<f32>) -> Result<()> {
        if self.scheme != EmbeddingScheme::External {
            return Err(KatraError::FeatureDisabled("external embeddings"));
        }
        if vector.is_empty() {
            return Err(KatraError::MissingInput("vector"));
        }
        self.put_vector(record_id, ci_id, vector)
    }

    fn put_vector(&self, record_id: &str, ci_id: &str, vector: Vec<f32>) -> Result<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.conn()?.execute(
            "INSERT INTO embeddings (record_id, ci_id, vector, dimensions, scheme, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(record_id) DO UPDATE SET
                 ci_id = excluded.ci_id,
                 vector = excluded.vector,
                 dimensions = excluded.dimensions,
                 scheme = excluded.scheme,
                 created_at = excluded.created_at",
            params![
                record_id,
                ci_id,
                to_bytes(&vector),
                vector.len() as i64,
                self.scheme.as_str(),
                now,
            ],
        )?;
        self.vectors
            .write()
            .map_err(|_| KatraError::LockPoisoned("vector map"))?
            .insert(
                record_id.to_string(),
                StoredVector {
                    ci_id: ci_id.to_string(),
                    vector,
                },
            );
        Ok(())
    }

    fn persist_stats_for(&self, terms: &[String]) -> Result<()> {
        let stats = self
            .stats
            .read()
            .map_err(|_| KatraError::LockPoisoned("corpus stats"))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO embedding_meta (key, value) VALUES ('doc_count', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![stats.doc_count.to_string()],
        )?;
        let mut stmt = conn.prepare(
            "INSERT INTO embedding_stats (term, doc_freq) VALUES (?1, ?2)
             ON CONFLICT(term) DO UPDATE SET doc_freq = excluded.doc_freq",
        )?;
        let mut seen: Vec<&String> = Vec::new();
        for term in terms {
            if !seen.contains(&term) {
                seen.push(term);
                if let Some(df) = stats.doc_freq.get(term) {
                    stmt.execute(params![term, *df as i64])?;
                }
            }
        }
        Ok(())
    }

    /// Drop a record's embedding
    pub fn remove(&self, record_id: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM embeddings WHERE record_id = ?1", params![record_id])?;
        self.vectors
            .write()
            .map_err(|_| KatraError::LockPoisoned("vector map"))?
            .remove(record_id);
        Ok(())
    }

    /// Erase all persisted embeddings for one agent
    pub fn clear(&self, ci_id: &str) -> Result<usize> {
        let removed = self
            .conn()?
            .execute("DELETE FROM embeddings WHERE ci_id = ?1", params![ci_id])?;
        self.vectors
            .write()
            .map_err(|_| KatraError::LockPoisoned("vector map"))?
            .retain(|_, v| v.ci_id != ci_id);
        Ok(removed)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Query embedding: read-only against the stats (never updates them)
    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(vector) = cache.get(query) {
                return Ok(vector.clone());
            }
        }
        let vector = {
            let stats = self
                .stats
                .read()
                .map_err(|_| KatraError::LockPoisoned("corpus stats"))?;
            embed(self.scheme, query, &stats)
        };
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(query.to_string(), vector.clone());
        }
        Ok(vector)
    }

    /// Cosine-nearest records of one agent, descending, capped at `top_k`
    pub fn search(&self, ci_id: &str, query: &str, top_k: usize) -> Result<Vec<(String, f32)>> {
        let query_vector = self.embed_query(query)?;
        let vectors = self
            .vectors
            .read()
            .map_err(|_| KatraError::LockPoisoned("vector map"))?;

        let mut hits: Vec<(String, f32)> = vectors
            .iter()
            .filter(|(_, stored)| stored.ci_id == ci_id)
            .map(|(id, stored)| (id.clone(), cosine_similarity(&query_vector, &stored.vector)))
            .filter(|(_, similarity)| *similarity > 0.0)
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    /// Whether a record has an embedding
    pub fn contains(&self, record_id: &str) -> bool {
        self.vectors
            .read()
            .map(|v| v.contains_key(record_id))
            .unwrap_or(false)
    }

    // ========================================================================
    // REGENERATION
    // ========================================================================

    /// Two-pass rebuild for one agent.
    ///
    /// Pass 1 recomputes the corpus statistics from every supplied content;
    /// pass 2 embeds with those statistics frozen, so later documents cannot
    /// bias earlier embeddings. Returns the number of embeddings written.
    pub fn regenerate_all(&self, ci_id: &str, contents: &[(String, String)]) -> Result<usize> {
        // Pass 1: fixed statistics
        let mut fresh = CorpusStats::default();
        for (_, content) in contents {
            fresh.add_document(&tokenize(content));
        }

        {
            let conn = self.conn()?;
            conn.execute("DELETE FROM embedding_stats", [])?;
            conn.execute(
                "INSERT INTO embedding_meta (key, value) VALUES ('doc_count', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![fresh.doc_count.to_string()],
            )?;
            let mut stmt =
                conn.prepare("INSERT INTO embedding_stats (term, doc_freq) VALUES (?1, ?2)")?;
            for (term, df) in &fresh.doc_freq {
                stmt.execute(params![term, *df as i64])?;
            }
        }
        *self
            .stats
            .write()
            .map_err(|_| KatraError::LockPoisoned("corpus stats"))? = fresh;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.clear();
        }

        // Pass 2: embed with stats frozen (read lock only)
        let mut written = 0;
        for (record_id, content) in contents {
            if tokenize(content).is_empty() {
                continue;
            }
            let vector = {
                let stats = self
                    .stats
                    .read()
                    .map_err(|_| KatraError::LockPoisoned("corpus stats"))?;
                embed(self.scheme, content, &stats)
            };
            self.put_vector(record_id, ci_id, vector)?;
            written += 1;
        }
        Ok(written)
    }

    /// Index statistics
    pub fn stats(&self) -> VectorStoreStats {
        VectorStoreStats {
            total_vectors: self.vectors.read().map(|v| v.len()).unwrap_or(0),
            scheme: self.scheme,
            corpus_docs: self.stats.read().map(|s| s.doc_count).unwrap_or(0),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
