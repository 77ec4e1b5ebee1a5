//! Working-memory budget
//!
//! Per-agent hygiene over session-scoped records. The hard limit deletes,
//! the soft limit merely un-scopes (the record stays but stops counting),
//! and both act on the oldest batch first.

use serde::{Deserialize, Serialize};

use crate::config::BudgetConfig;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::tier1::Tier1Store;
use crate::vector::VectorStore;

/// What one budget tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action", content = "count")]
pub enum BudgetAction {
    /// Under both limits, or the budget is disabled
    None,
    /// Soft limit: oldest batch un-scoped, records kept
    Softened(usize),
    /// Hard limit: oldest batch deleted
    Evicted(usize),
}

/// Session-scoped record budget for one engine
#[derive(Debug, Clone)]
pub struct WorkingMemoryBudget {
    config: BudgetConfig,
}

impl WorkingMemoryBudget {
    /// Budget with the given limits
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    /// Current limits
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Replace the limits at runtime
    pub fn set_config(&mut self, config: BudgetConfig) {
        self.config = config;
    }

    /// One tick for one agent.
    ///
    /// The hard path fires at exactly `hard_limit`; the soft path needs
    /// strictly more than `soft_limit`, so a population sitting exactly at
    /// the soft limit is a fixpoint and repeated ticks are a no-op.
    pub fn tick(
        &self,
        tier1: &Tier1Store,
        graph: Option<&GraphStore>,
        vector: Option<&VectorStore>,
        ci_id: &str,
    ) -> Result<BudgetAction> {
        if !self.config.enabled {
            return Ok(BudgetAction::None);
        }

        let count = tier1.session_scoped_count(ci_id)?;
        if count >= self.config.hard_limit {
            let victims = tier1.oldest_session_scoped(ci_id, self.config.batch_size)?;
            let ids: Vec<String> = victims.iter().map(|r| r.id.clone()).collect();
            let deleted = tier1.delete_many(&ids)?;
            for id in &ids {
                if let Some(graph) = graph {
                    graph.remove_record(id)?;
                }
                if let Some(vector) = vector {
                    vector.remove(id)?;
                }
            }
            tracing::info!(ci_id, deleted, "working-memory hard limit eviction");
            Ok(BudgetAction::Evicted(deleted))
        } else if count > self.config.soft_limit {
            let victims = tier1.oldest_session_scoped(ci_id, self.config.batch_size)?;
            let ids: Vec<String> = victims.iter().map(|r| r.id.clone()).collect();
            let softened = tier1.clear_session_scope(&ids)?;
            tracing::debug!(ci_id, softened, "working-memory soft limit conversion");
            Ok(BudgetAction::Softened(softened))
        } else {
            Ok(BudgetAction::None)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
