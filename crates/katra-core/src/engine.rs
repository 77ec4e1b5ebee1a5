//! Engine handle
//!
//! [`Katra`] is the single handle the host owns: configuration, home
//! layout, both tiers, the vector and graph indices (each behind its own
//! lock), the message bus, and the working-memory budget. All methods take
//! `&self`; the handle is `Send + Sync` and lives happily behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::budget::{BudgetAction, WorkingMemoryBudget};
use crate::bus::MessageBus;
use crate::config::KatraConfig;
use crate::consolidation::{ArchiveReport, Archiver, ExtractiveSummarizer, Summarizer};
use crate::error::{KatraError, Result};
use crate::graph::{GraphStore, HubRecord};
use crate::maintenance::{self, HealthReport, MaintenanceReport};
use crate::record::{
    parse_why_remember, CreateRecordInput, Digest, HealthStatus, MemoryRecord, MetadataUpdate,
    ParsedImportance, RecordFilter,
};
use crate::search::{append_associations, fuse, HybridSearchConfig, SearchHit};
use crate::tier1::{StoreOutcome, Tier1Stats, Tier1Store};
use crate::tier2::{DigestFilter, DigestStore};
use crate::vector::VectorStore;

/// Aggregate view for metacognitive queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryOverview {
    /// Tier-1 statistics
    pub tier1: Tier1Stats,
    /// Embeddings held by the vector index (0 when disabled)
    pub vectors: usize,
    /// Directed edges in the association graph (0 when disabled)
    pub graph_edges: usize,
    /// Best-connected records
    pub hubs: Vec<HubRecord>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The memory substrate handle
pub struct Katra {
    config: RwLock<KatraConfig>,
    home: PathBuf,
    tier1: Tier1Store,
    tier2: DigestStore,
    vector: RwLock<Option<VectorStore>>,
    graph: RwLock<Option<GraphStore>>,
    bus: MessageBus,
    budget: WorkingMemoryBudget,
    summarizer: Box<dyn Summarizer>,
}

impl Katra {
    /// Open the engine under an explicit home directory.
    ///
    /// Layout: `memory/tier1/` (journal + index), `memory/tier2/` (buckets
    /// + digest index), `chat/chat.db` (message bus).
    pub fn open(home: &Path, config: KatraConfig) -> Result<Self> {
        Self::open_with_summarizer(home, config, Box::new(ExtractiveSummarizer))
    }

    /// Open with a caller-provided summarizer collaborator
    pub fn open_with_summarizer(
        home: &Path,
        config: KatraConfig,
        summarizer: Box<dyn Summarizer>,
    ) -> Result<Self> {
        std::fs::create_dir_all(home)?;

        let tier1 = Tier1Store::open(&home.join("memory/tier1"))?;
        let tier2 = DigestStore::open(
            &home.join("memory/tier2"),
            config.archival.tier2_max_file_size_mb,
        )?;
        let bus = MessageBus::open(&home.join("chat/chat.db"), config.bus.clone())?;

        let vector = if config.semantic_search_enabled {
            Some(VectorStore::open(
                tier1.index_path(),
                config.embedding_scheme,
            )?)
        } else {
            None
        };
        let graph = if config.graph_edges_enabled {
            Some(GraphStore::open(tier1.index_path())?)
        } else {
            None
        };

        let budget = WorkingMemoryBudget::new(config.budget.clone());

        Ok(Self {
            config: RwLock::new(config),
            home: home.to_path_buf(),
            tier1,
            tier2,
            vector: RwLock::new(vector),
            graph: RwLock::new(graph),
            bus,
            budget,
            summarizer,
        })
    }

    /// Open under the platform data directory (`~/.local/share/katra` style)
    pub fn open_default(config: KatraConfig) -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "katra", "katra")
            .ok_or_else(|| KatraError::Invariant("no home directory available".into()))?;
        let home = dirs.data_dir().to_path_buf();
        Self::open(&home, config)
    }

    /// Engine home directory
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> KatraConfig {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// The message bus
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Direct Tier-1 store access (restore tooling, test harnesses)
    pub fn tier1(&self) -> &Tier1Store {
        &self.tier1
    }

    // ========================================================================
    // CONFIG SETTERS (feature toggles construct or tear down indices)
    // ========================================================================

    /// Toggle semantic search. Enabling reopens the vector index from its
    /// persisted embeddings, so a disable/enable pair leaves retrieval
    /// behavior unchanged.
    pub fn set_semantic_search_enabled(&self, enabled: bool) -> Result<()> {
        let mut vector = self
            .vector
            .write()
            .map_err(|_| KatraError::LockPoisoned("vector handle"))?;
        let scheme = self.config().embedding_scheme;
        if enabled && vector.is_none() {
            *vector = Some(VectorStore::open(self.tier1.index_path(), scheme)?);
        } else if !enabled {
            *vector = None;
        }
        drop(vector);
        self.config
            .write()
            .map_err(|_| KatraError::LockPoisoned("config"))?
            .semantic_search_enabled = enabled;
        Ok(())
    }

    /// Toggle automatic graph wiring
    pub fn set_graph_edges_enabled(&self, enabled: bool) -> Result<()> {
        let mut graph = self
            .graph
            .write()
            .map_err(|_| KatraError::LockPoisoned("graph handle"))?;
        if enabled && graph.is_none() {
            *graph = Some(GraphStore::open(self.tier1.index_path())?);
        } else if !enabled {
            *graph = None;
        }
        drop(graph);
        self.config
            .write()
            .map_err(|_| KatraError::LockPoisoned("config"))?
            .graph_edges_enabled = enabled;
        Ok(())
    }

    // ========================================================================
    // REMEMBER
    // ========================================================================

    /// Record a typed memory.
    ///
    /// Dedups inside the configured window, appends to Tier 1, indexes the
    /// embedding, wires graph edges, and leaves budget accounting to the
    /// session-scope flag. A failed embedding degrades with a warning; the
    /// record still lands. Under critical pressure, writes below the
    /// importance floor are refused.
    pub fn remember(&self, input: CreateRecordInput) -> Result<MemoryRecord> {
        let config = self.config();

        let health = self.health()?;
        if health.status == HealthStatus::Critical
            && input.importance < config.critical_importance_floor
        {
            return Err(KatraError::MemoryTierFull);
        }

        let record = input.into_record(config.max_record_len)?;
        let outcome = self
            .tier1
            .store(&record, Duration::seconds(config.dedup_window_secs))?;

        let record = match outcome {
            StoreOutcome::Deduplicated(id) => {
                return self
                    .tier1
                    .get(&id)?
                    .ok_or_else(|| KatraError::NotFound(format!("record {id}")));
            }
            StoreOutcome::Inserted(_) => record,
        };

        // Embedding failure degrades recall, not the write
        if let Ok(vector) = self.vector.read() {
            if let Some(vector) = vector.as_ref() {
                if let Err(e) = vector.store(&record.id, &record.ci_id, &record.content) {
                    tracing::warn!(record_id = %record.id, "embedding failed, continuing: {}", e);
                }
            }
        }

        if let Err(e) = self.wire_graph(&record, &config) {
            tracing::warn!(record_id = %record.id, "graph wiring failed, continuing: {}", e);
        }

        Ok(record)
    }

    /// Convenience wrapper: parse the "why remember" phrase and store
    pub fn remember_with_phrase(
        &self,
        ci_id: &str,
        content: &str,
        why: &str,
    ) -> Result<MemoryRecord> {
        let parsed = parse_why_remember(why);
        let mut input = CreateRecordInput::new(ci_id, content);
        input.importance = parsed.importance;
        self.remember(input)
    }

    fn wire_graph(&self, record: &MemoryRecord, config: &KatraConfig) -> Result<()> {
        let graph = self
            .graph
            .read()
            .map_err(|_| KatraError::LockPoisoned("graph handle"))?;
        let Some(graph) = graph.as_ref() else {
            return Ok(());
        };

        // SIMILAR pairs from the vector index
        if let Ok(vector) = self.vector.read() {
            if let Some(vector) = vector.as_ref() {
                let candidates = vector.search(
                    &record.ci_id,
                    &record.content,
                    config.max_similar_edges + 1,
                )?;
                let mut wired = 0;
                for (other_id, similarity) in candidates {
                    if other_id == record.id || wired >= config.max_similar_edges {
                        continue;
                    }
                    if similarity >= config.similarity_threshold {
                        graph.add_similar_pair(
                            &record.id,
                            &other_id,
                            similarity as f64,
                            &format!("cosine {similarity:.2}"),
                        )?;
                        wired += 1;
                    }
                }
            }
        }

        // SEQUENTIAL edge from the most recent prior memory
        if let Some(prior) = self.tier1.most_recent_prior(&record.ci_id, &record.id)? {
            let gap = record.created_at - prior.created_at;
            if gap <= Duration::seconds(config.temporal_window_secs) && gap >= Duration::zero() {
                graph.add_sequential(&prior.id, &record.id)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // RECALL
    // ========================================================================

    /// Filtered Tier-1 query (updates access times)
    pub fn recall(&self, filter: &RecordFilter) -> Result<Vec<MemoryRecord>> {
        self.tier1.query(filter)
    }

    /// Fetch one record without touching access time
    pub fn get_record(&self, id: &str) -> Result<Option<MemoryRecord>> {
        self.tier1.get(id)
    }

    /// Hybrid search: keyword + semantic phases merged by max score, then
    /// graph context expansion
    pub fn recall_about(&self, ci_id: &str, topic: &str) -> Result<Vec<SearchHit>> {
        let config = self.config();
        let search_config = HybridSearchConfig {
            semantic_threshold: config.semantic_threshold,
            ..Default::default()
        };

        let keyword_hits = self.tier1.keyword_search(ci_id, topic)?;

        let mut semantic_hits = Vec::new();
        if let Ok(vector) = self.vector.read() {
            if let Some(vector) = vector.as_ref() {
                for (record_id, similarity) in
                    vector.search(ci_id, topic, search_config.semantic_top_k)?
                {
                    if similarity < search_config.semantic_threshold {
                        continue;
                    }
                    if let Some(record) = self.tier1.get(&record_id)? {
                        semantic_hits.push((record, similarity));
                    }
                }
            }
        }

        let mut hits = fuse(keyword_hits, semantic_hits);

        if let Ok(graph) = self.graph.read() {
            if let Some(graph) = graph.as_ref() {
                // Context expansion: pull neighbors of the best direct hits
                if search_config.expand_top > 0 {
                    let mut associations = Vec::new();
                    for hit in hits.iter().take(search_config.expand_top) {
                        for edge in graph.edges_from(&hit.record.id)? {
                            if let Some(record) = self.tier1.get(&edge.dst_id)? {
                                associations.push((record, edge.weight as f32));
                            }
                        }
                    }
                    append_associations(
                        &mut hits,
                        associations,
                        search_config.association_damping,
                    );
                }

                // Connectivity fields are derived at read time, never stored
                for hit in &mut hits {
                    hit.record.connection_count =
                        Some(graph.connection_count(&hit.record.id)?);
                    hit.record.graph_centrality = Some(graph.centrality(&hit.record.id)?);
                }
            }
        }

        Ok(hits)
    }

    /// Parse a "why remember" phrase
    pub fn parse_importance(&self, phrase: &str) -> ParsedImportance {
        parse_why_remember(phrase)
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Pin a record against archival and eviction
    pub fn mark_important(&self, record_id: &str) -> Result<()> {
        self.tier1.set_marked_important(record_id, true)
    }

    /// Flag a record for archival at the next consolidation
    pub fn mark_forgettable(&self, record_id: &str) -> Result<()> {
        self.tier1.set_marked_forgettable(record_id, true)
    }

    /// Partial metadata mutation
    pub fn update_metadata(&self, record_id: &str, update: &MetadataUpdate) -> Result<MemoryRecord> {
        self.tier1.update_metadata(record_id, update)
    }

    /// Group records under one pattern id
    pub fn assign_pattern(&self, record_ids: &[String], pattern_id: &str) -> Result<usize> {
        self.tier1.assign_pattern(record_ids, pattern_id)
    }

    /// Delete one record and its index entries
    pub fn forget(&self, record_id: &str) -> Result<bool> {
        let deleted = self.tier1.delete(record_id)?;
        if deleted {
            if let Ok(graph) = self.graph.read() {
                if let Some(graph) = graph.as_ref() {
                    graph.remove_record(record_id)?;
                }
            }
            if let Ok(vector) = self.vector.read() {
                if let Some(vector) = vector.as_ref() {
                    vector.remove(record_id)?;
                }
            }
        }
        Ok(deleted)
    }

    // ========================================================================
    // ARCHIVAL AND TIER 2
    // ========================================================================

    /// Archive one agent's records older than `days` into weekly digests
    pub fn archive_older_than(&self, ci_id: &str, days: i64) -> Result<ArchiveReport> {
        let config = self.config();
        let vector = self
            .vector
            .read()
            .map_err(|_| KatraError::LockPoisoned("vector handle"))?;
        let graph = self
            .graph
            .read()
            .map_err(|_| KatraError::LockPoisoned("graph handle"))?;
        let archiver = Archiver {
            tier1: &self.tier1,
            tier2: &self.tier2,
            graph: graph.as_ref(),
            vector: vector.as_ref(),
            summarizer: self.summarizer.as_ref(),
            config: &config.archival,
        };
        archiver.archive_older_than(ci_id, days)
    }

    /// Query Tier-2 digests
    pub fn digests(&self, filter: &DigestFilter) -> Result<Vec<Digest>> {
        self.tier2.query(filter)
    }

    /// Fetch one digest by id
    pub fn digest_by_id(&self, digest_id: &str) -> Result<Option<Digest>> {
        self.tier2.get_by_id(digest_id)
    }

    /// Rebuild the Tier-2 index from the bucket files
    pub fn rebuild_digest_index(&self) -> Result<usize> {
        self.tier2.rebuild_index()
    }

    // ========================================================================
    // VECTOR AND GRAPH MAINTENANCE
    // ========================================================================

    /// Erase one agent's persisted embeddings
    pub fn clear_embeddings(&self, ci_id: &str) -> Result<usize> {
        let vector = self
            .vector
            .read()
            .map_err(|_| KatraError::LockPoisoned("vector handle"))?;
        let vector = vector
            .as_ref()
            .ok_or(KatraError::FeatureDisabled("semantic search"))?;
        vector.clear(ci_id)
    }

    /// Two-pass embedding regeneration for one agent
    pub fn regenerate_embeddings(&self, ci_id: &str) -> Result<usize> {
        let vector = self
            .vector
            .read()
            .map_err(|_| KatraError::LockPoisoned("vector handle"))?;
        let vector = vector
            .as_ref()
            .ok_or(KatraError::FeatureDisabled("semantic search"))?;
        let contents = self.tier1.all_content(ci_id)?;
        vector.regenerate_all(ci_id, &contents)
    }

    /// Recompute SIMILAR edges from the current vector index. The explicit
    /// rebuild step after an embedding scheme change; SEQUENTIAL edges are
    /// untouched.
    pub fn rewire_similar(&self, ci_id: &str) -> Result<usize> {
        let config = self.config();
        let graph_guard = self
            .graph
            .read()
            .map_err(|_| KatraError::LockPoisoned("graph handle"))?;
        let graph = graph_guard
            .as_ref()
            .ok_or(KatraError::FeatureDisabled("graph edges"))?;
        let vector_guard = self
            .vector
            .read()
            .map_err(|_| KatraError::LockPoisoned("vector handle"))?;
        let vector = vector_guard
            .as_ref()
            .ok_or(KatraError::FeatureDisabled("semantic search"))?;

        graph.clear_similar()?;
        let mut wired = 0;
        for (record_id, content) in self.tier1.all_content(ci_id)? {
            let candidates = vector.search(ci_id, &content, config.max_similar_edges + 1)?;
            let mut per_record = 0;
            for (other_id, similarity) in candidates {
                if other_id == record_id || per_record >= config.max_similar_edges {
                    continue;
                }
                if similarity >= config.similarity_threshold {
                    graph.add_similar_pair(
                        &record_id,
                        &other_id,
                        similarity as f64,
                        &format!("cosine {similarity:.2}"),
                    )?;
                    per_record += 1;
                    wired += 1;
                }
            }
        }
        Ok(wired)
    }

    // ========================================================================
    // HEALTH AND MAINTENANCE
    // ========================================================================

    /// Current Tier-1 pressure
    pub fn health(&self) -> Result<HealthReport> {
        let config = self.config();
        Ok(maintenance::compute_health(
            self.tier1.total_count()?,
            config.tier1_soft_limit,
            config.tier1_hard_limit,
        ))
    }

    /// Per-agent statistics plus index views
    pub fn overview(&self, ci_id: &str) -> Result<MemoryOverview> {
        let tier1 = self.tier1.stats(ci_id)?;
        let vectors = self
            .vector
            .read()
            .ok()
            .and_then(|v| v.as_ref().map(|v| v.stats().total_vectors))
            .unwrap_or(0);
        let (graph_edges, hubs) = match self.graph.read() {
            Ok(guard) => match guard.as_ref() {
                Some(graph) => (graph.edge_count(), graph.hubs(5)?),
                None => (0, Vec::new()),
            },
            Err(_) => (0, Vec::new()),
        };
        Ok(MemoryOverview {
            tier1,
            vectors,
            graph_edges,
            hubs,
        })
    }

    /// Every agent with Tier-1 records
    pub fn all_agents(&self) -> Result<Vec<String>> {
        self.tier1.all_agents()
    }

    /// One working-memory budget tick for one agent
    pub fn budget_tick(&self, ci_id: &str) -> Result<BudgetAction> {
        let vector = self
            .vector
            .read()
            .map_err(|_| KatraError::LockPoisoned("vector handle"))?;
        let graph = self
            .graph
            .read()
            .map_err(|_| KatraError::LockPoisoned("graph handle"))?;
        self.budget
            .tick(&self.tier1, graph.as_ref(), vector.as_ref(), ci_id)
    }

    /// Run one maintenance tick now
    pub fn run_maintenance(&self) -> MaintenanceReport {
        maintenance::run_once(self)
    }

    /// Durability barrier: journal fsync + WAL checkpoint
    pub fn flush(&self) -> Result<()> {
        self.tier1.flush()
    }

    /// Flush and checkpoint every database; call before dropping the handle
    pub fn shutdown(&self) -> Result<()> {
        self.flush()?;
        self.tier1.checkpoint_truncate()?;
        self.bus.checkpoint_truncate()?;
        tracing::info!("engine shut down cleanly");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryType;
    use tempfile::TempDir;

    fn engine() -> (Katra, TempDir) {
        let dir = TempDir::new().unwrap();
        let engine = Katra::open(dir.path(), KatraConfig::default()).unwrap();
        (engine, dir)
    }

    #[test]
    fn test_remember_and_recall() {
        let (engine, _dir) = engine();
        let record = engine
            .remember(CreateRecordInput::new("alice", "deployed v1 to staging"))
            .unwrap();
        assert!(!record.id.is_empty());

        let results = engine.recall(&RecordFilter::for_agent("alice")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "deployed v1 to staging");
    }

    #[test]
    fn test_remember_dedups_and_returns_existing() {
        let (engine, _dir) = engine();
        let first = engine
            .remember(CreateRecordInput::new("alice", "build succeeded"))
            .unwrap();
        let second = engine
            .remember(CreateRecordInput::new("alice", "build succeeded"))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(engine.recall(&RecordFilter::for_agent("alice")).unwrap().len(), 1);
    }

    #[test]
    fn test_recall_about_keyword_and_semantic_flags() {
        let (engine, _dir) = engine();
        for content in ["deployed v1 to staging", "deployed v1 to prod", "lunch with Casey"] {
            engine.remember(CreateRecordInput::new("alice", content)).unwrap();
        }

        let hits = engine.recall_about("alice", "deployed").unwrap();
        let direct: Vec<&SearchHit> = hits.iter().filter(|h| !h.from_association).collect();
        assert_eq!(direct.len(), 2);
        assert!(direct.iter().all(|h| h.from_keyword));
    }

    #[test]
    fn test_graph_wiring_creates_sequential_edges() {
        let (engine, _dir) = engine();
        let first = engine
            .remember(CreateRecordInput::new("alice", "started the migration"))
            .unwrap();
        let second = engine
            .remember(CreateRecordInput::new("alice", "migration step two"))
            .unwrap();

        let graph = engine.graph.read().unwrap();
        let edges = graph.as_ref().unwrap().edges_from(&first.id).unwrap();
        assert!(edges.iter().any(|e| e.dst_id == second.id));
    }

    #[test]
    fn test_critical_pressure_refuses_low_importance_writes() {
        let dir = TempDir::new().unwrap();
        let config = KatraConfig {
            tier1_soft_limit: 1,
            tier1_hard_limit: 2,
            dedup_window_secs: 0,
            ..Default::default()
        };
        let engine = Katra::open(dir.path(), config).unwrap();

        engine.remember(CreateRecordInput::new("alice", "one")).unwrap();
        engine.remember(CreateRecordInput::new("alice", "two")).unwrap();
        assert_eq!(engine.health().unwrap().status, HealthStatus::Critical);

        let err = engine
            .remember(CreateRecordInput::new("alice", "three"))
            .unwrap_err();
        assert!(matches!(err, KatraError::MemoryTierFull));

        // High-importance writes still land under pressure
        let mut important = CreateRecordInput::new("alice", "the outage root cause");
        important.importance = 0.9;
        engine.remember(important).unwrap();
    }

    #[test]
    fn test_toggle_semantic_search_preserves_retrieval() {
        let (engine, _dir) = engine();
        for content in ["deployed v1 to staging", "deployed v1 to prod"] {
            engine.remember(CreateRecordInput::new("alice", content)).unwrap();
        }
        let before = engine.recall_about("alice", "deployed").unwrap();

        engine.set_semantic_search_enabled(false).unwrap();
        engine.set_semantic_search_enabled(true).unwrap();
        let after = engine.recall_about("alice", "deployed").unwrap();

        let ids = |hits: &[SearchHit]| {
            let mut v: Vec<String> = hits.iter().map(|h| h.record.id.clone()).collect();
            v.sort();
            v
        };
        assert_eq!(ids(&before), ids(&after));
    }

    #[test]
    fn test_forget_cleans_indices() {
        let (engine, _dir) = engine();
        let record = engine
            .remember(CreateRecordInput::new("alice", "temporary note"))
            .unwrap();
        assert!(engine.forget(&record.id).unwrap());
        assert!(engine.get_record(&record.id).unwrap().is_none());
        assert!(!engine.forget(&record.id).unwrap());
    }

    #[test]
    fn test_overview() {
        let (engine, _dir) = engine();
        let mut input = CreateRecordInput::new("alice", "a decision was made");
        input.memory_type = MemoryType::Decision;
        engine.remember(input).unwrap();

        let overview = engine.overview("alice").unwrap();
        assert_eq!(overview.tier1.total, 1);
        assert_eq!(overview.vectors, 1);
    }

    #[test]
    fn test_maintenance_tick_runs_clean() {
        let (engine, _dir) = engine();
        engine.remember(CreateRecordInput::new("alice", "note")).unwrap();
        let report = engine.run_maintenance();
        assert_eq!(report.errors, 0);
        assert_eq!(report.health.status, HealthStatus::Healthy);
        assert!(!report.forced_consolidation);
    }

    #[test]
    fn test_shutdown_flushes() {
        let dir = TempDir::new().unwrap();
        {
            let engine = Katra::open(dir.path(), KatraConfig::default()).unwrap();
            engine.remember(CreateRecordInput::new("alice", "survives restart")).unwrap();
            engine.shutdown().unwrap();
        }
        let engine = Katra::open(dir.path(), KatraConfig::default()).unwrap();
        assert_eq!(engine.recall(&RecordFilter::for_agent("alice")).unwrap().len(), 1);
    }
}
