//! Graph index
//!
//! Labeled directed edges between records. The graph is an index, not an
//! owner: edges reference record ids and die with the records they touch.
//! Adjacency lives in memory behind its own lock with write-through
//! persistence to the `graph_edges` table (FK cascade from records).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{KatraError, Result};
use crate::tier1::Tier1Store;

// ============================================================================
// EDGE MODEL
// ============================================================================

/// Relationship kind carried by an edge
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeLabel {
    /// Vector-similarity association; always created as a bidirected pair
    Similar,
    /// Temporal proximity; runs from the prior memory to the new one
    Sequential,
    /// Members of the same detected pattern
    Pattern,
    /// Explicit caller-provided link
    Reference,
}

impl EdgeLabel {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::Similar => "similar",
            EdgeLabel::Sequential => "sequential",
            EdgeLabel::Pattern => "pattern",
            EdgeLabel::Reference => "reference",
        }
    }

    /// Parse from string name; unknown names fall back to Reference
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "similar" => EdgeLabel::Similar,
            "sequential" => EdgeLabel::Sequential,
            "pattern" => EdgeLabel::Pattern,
            _ => EdgeLabel::Reference,
        }
    }
}

impl std::fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed labeled edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Source record id
    pub src_id: String,
    /// Destination record id
    pub dst_id: String,
    /// Relationship kind
    pub label: EdgeLabel,
    /// Why the edge exists ("cosine 0.82", "within temporal window")
    pub reason: Option<String>,
    /// Strength in [0,1]
    pub weight: f64,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
}

/// A node's connectivity summary for metacognitive queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubRecord {
    /// Record id
    pub record_id: String,
    /// Distinct neighbors
    pub connections: usize,
    /// connections / max observed
    pub centrality: f64,
}

// ============================================================================
// GRAPH STORE
// ============================================================================

/// Per-process association graph with write-through persistence
pub struct GraphStore {
    conn: Mutex<Connection>,
    outgoing: RwLock<HashMap<String, Vec<GraphEdge>>>,
    incoming: RwLock<HashMap<String, HashSet<String>>>,
}

impl GraphStore {
    /// Open against the Tier-1 index database (schema already applied)
    pub fn open(index_path: &Path) -> Result<Self> {
        let conn = Connection::open(index_path)?;
        Tier1Store::configure_connection(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
            outgoing: RwLock::new(HashMap::new()),
            incoming: RwLock::new(HashMap::new()),
        };
        store.load()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KatraError::LockPoisoned("graph store"))
    }

    fn load(&self) -> Result<()> {
        let edges = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT src_id, dst_id, label, reason, weight, created_at FROM graph_edges",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(GraphEdge {
                    src_id: row.get(0)?,
                    dst_id: row.get(1)?,
                    label: EdgeLabel::parse_name(&row.get::<_, String>(2)?),
                    reason: row.get(3)?,
                    weight: row.get(4)?,
                    created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(5)?)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut outgoing: HashMap<String, Vec<GraphEdge>> = HashMap::new();
        let mut incoming: HashMap<String, HashSet<String>> = HashMap::new();
        for edge in edges {
            incoming
                .entry(edge.dst_id.clone())
                .or_default()
                .insert(edge.src_id.clone());
            outgoing.entry(edge.src_id.clone()).or_default().push(edge);
        }
        *self
            .outgoing
            .write()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))? = outgoing;
        *self
            .incoming
            .write()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))? = incoming;
        Ok(())
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Insert one directed edge. Self-edges are an invariant violation;
    /// weight must sit in [0,1].
    pub fn add_edge(&self, edge: GraphEdge) -> Result<()> {
        if edge.src_id == edge.dst_id {
            return Err(KatraError::Invariant(format!(
                "self-edge on record {}",
                edge.src_id
            )));
        }
        if !(0.0..=1.0).contains(&edge.weight) {
            return Err(KatraError::OutOfRange { field: "weight" });
        }

        self.conn()?.execute(
            "INSERT INTO graph_edges (src_id, dst_id, label, reason, weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(src_id, dst_id, label) DO UPDATE SET
                 reason = excluded.reason,
                 weight = excluded.weight",
            params![
                edge.src_id,
                edge.dst_id,
                edge.label.as_str(),
                edge.reason,
                edge.weight,
                edge.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;

        {
            let mut incoming = self
                .incoming
                .write()
                .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
            incoming
                .entry(edge.dst_id.clone())
                .or_default()
                .insert(edge.src_id.clone());
        }
        let mut outgoing = self
            .outgoing
            .write()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
        let list = outgoing.entry(edge.src_id.clone()).or_default();
        if let Some(existing) = list
            .iter_mut()
            .find(|e| e.dst_id == edge.dst_id && e.label == edge.label)
        {
            *existing = edge;
        } else {
            list.push(edge);
        }
        Ok(())
    }

    /// SIMILAR edges always land as a bidirected pair with identical weight
    /// and reason
    pub fn add_similar_pair(&self, a: &str, b: &str, weight: f64, reason: &str) -> Result<()> {
        let now = Utc::now();
        self.add_edge(GraphEdge {
            src_id: a.to_string(),
            dst_id: b.to_string(),
            label: EdgeLabel::Similar,
            reason: Some(reason.to_string()),
            weight,
            created_at: now,
        })?;
        self.add_edge(GraphEdge {
            src_id: b.to_string(),
            dst_id: a.to_string(),
            label: EdgeLabel::Similar,
            reason: Some(reason.to_string()),
            weight,
            created_at: now,
        })
    }

    /// SEQUENTIAL edge from the prior memory to the new one, weight 1
    pub fn add_sequential(&self, prior: &str, new: &str) -> Result<()> {
        self.add_edge(GraphEdge {
            src_id: prior.to_string(),
            dst_id: new.to_string(),
            label: EdgeLabel::Sequential,
            reason: Some("within temporal window".to_string()),
            weight: 1.0,
            created_at: Utc::now(),
        })
    }

    /// Drop every edge touching a record (record deletion path)
    pub fn remove_record(&self, record_id: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM graph_edges WHERE src_id = ?1 OR dst_id = ?1",
            params![record_id],
        )?;

        let mut outgoing = self
            .outgoing
            .write()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
        outgoing.remove(record_id);
        for list in outgoing.values_mut() {
            list.retain(|e| e.dst_id != record_id);
        }
        drop(outgoing);

        let mut incoming = self
            .incoming
            .write()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
        incoming.remove(record_id);
        for set in incoming.values_mut() {
            set.remove(record_id);
        }
        Ok(())
    }

    /// Drop every SIMILAR edge; the rebuild path after a scheme change
    pub fn clear_similar(&self) -> Result<usize> {
        let removed = self
            .conn()?
            .execute("DELETE FROM graph_edges WHERE label = 'similar'", [])?;
        let mut outgoing = self
            .outgoing
            .write()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
        for list in outgoing.values_mut() {
            list.retain(|e| e.label != EdgeLabel::Similar);
        }
        drop(outgoing);
        self.rebuild_incoming()?;
        Ok(removed)
    }

    fn rebuild_incoming(&self) -> Result<()> {
        let outgoing = self
            .outgoing
            .read()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
        let mut incoming: HashMap<String, HashSet<String>> = HashMap::new();
        for edges in outgoing.values() {
            for edge in edges {
                incoming
                    .entry(edge.dst_id.clone())
                    .or_default()
                    .insert(edge.src_id.clone());
            }
        }
        drop(outgoing);
        *self
            .incoming
            .write()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))? = incoming;
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Outgoing edges of a record, strongest first
    pub fn edges_from(&self, record_id: &str) -> Result<Vec<GraphEdge>> {
        let outgoing = self
            .outgoing
            .read()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
        let mut edges = outgoing.get(record_id).cloned().unwrap_or_default();
        edges.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        Ok(edges)
    }

    /// Distinct neighbor ids across both edge directions
    pub fn neighbors(&self, record_id: &str) -> Result<HashSet<String>> {
        let mut neighbors = HashSet::new();
        {
            let outgoing = self
                .outgoing
                .read()
                .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
            if let Some(edges) = outgoing.get(record_id) {
                for edge in edges {
                    neighbors.insert(edge.dst_id.clone());
                }
            }
        }
        let incoming = self
            .incoming
            .read()
            .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
        if let Some(sources) = incoming.get(record_id) {
            for src in sources {
                neighbors.insert(src.clone());
            }
        }
        Ok(neighbors)
    }

    /// Distinct neighbor count
    pub fn connection_count(&self, record_id: &str) -> Result<usize> {
        Ok(self.neighbors(record_id)?.len())
    }

    fn node_ids(&self) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();
        {
            let outgoing = self
                .outgoing
                .read()
                .map_err(|_| KatraError::LockPoisoned("graph adjacency"))?;
            for (src, edges) in outgoing.iter() {
                ids.insert(src.clone());
                for edge in edges {
                    ids.insert(edge.dst_id.clone());
                }
            }
        }
        Ok(ids)
    }

    /// Centrality of a record: connections / max connections observed.
    ///
    /// Derived on demand; never a stored field.
    pub fn centrality(&self, record_id: &str) -> Result<f64> {
        let own = self.connection_count(record_id)?;
        if own == 0 {
            return Ok(0.0);
        }
        let mut max = own;
        for id in self.node_ids()? {
            let count = self.connection_count(&id)?;
            if count > max {
                max = count;
            }
        }
        Ok(own as f64 / max as f64)
    }

    /// Best-connected records, for metacognitive "what are my hubs" queries
    pub fn hubs(&self, limit: usize) -> Result<Vec<HubRecord>> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for id in self.node_ids()? {
            counts.push((id.clone(), self.connection_count(&id)?));
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let max = counts.first().map(|(_, c)| *c).unwrap_or(0).max(1);
        Ok(counts
            .into_iter()
            .take(limit)
            .map(|(record_id, connections)| HubRecord {
                record_id,
                connections,
                centrality: connections as f64 / max as f64,
            })
            .collect())
    }

    /// Total directed edge count
    pub fn edge_count(&self) -> usize {
        self.outgoing
            .read()
            .map(|o| o.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
