//! Maintenance loop and health
//!
//! One tick coordinates the whole substrate: health computation, forced or
//! scheduled consolidation, Tier-1 flush, working-memory hygiene, and bus
//! cleanup. Errors are logged and counted; a tick never takes the process
//! down with it.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};

use crate::budget::BudgetAction;
use crate::bus::BusCleanup;
use crate::consolidation::ArchiveReport;
use crate::engine::Katra;
use crate::record::HealthStatus;

// ============================================================================
// HEALTH
// ============================================================================

/// Tier-1 pressure snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Wire status ("healthy"/"degraded"/"critical")
    pub status: HealthStatus,
    /// Records across all agents
    pub tier1_records: usize,
    /// Records as a percentage of the hard limit
    pub fill_percent: f64,
    /// Below this count the store is healthy
    pub soft_limit: usize,
    /// At this count the store is critical
    pub hard_limit: usize,
}

/// Derive the pressure tier from a record count
pub fn compute_health(tier1_records: usize, soft_limit: usize, hard_limit: usize) -> HealthReport {
    let status = if tier1_records >= hard_limit {
        HealthStatus::Critical
    } else if tier1_records >= soft_limit {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    HealthReport {
        status,
        tier1_records,
        fill_percent: (tier1_records as f64 / hard_limit.max(1) as f64) * 100.0,
        soft_limit,
        hard_limit,
    }
}

// ============================================================================
// TICK
// ============================================================================

/// What one maintenance tick did
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    /// Health at the start of the tick
    pub health: HealthReport,
    /// Whether critical pressure forced consolidation
    pub forced_consolidation: bool,
    /// Aggregated archival results across agents
    pub archive: ArchiveReport,
    /// Per-agent budget outcomes
    pub budget_actions: Vec<(String, BudgetAction)>,
    /// Bus cleanup counters
    pub bus_cleanup: BusCleanup,
    /// Non-fatal failures logged during the tick
    pub errors: usize,
}

/// Run one maintenance tick against an engine.
///
/// Step order: health, (forced) consolidation, flush, budget, bus cleanup.
/// Each step failure is logged and counted; the tick always completes.
pub fn run_once(engine: &Katra) -> MaintenanceReport {
    let mut errors = 0usize;

    let health = engine.health().unwrap_or_else(|e| {
        tracing::warn!("health computation failed: {}", e);
        errors += 1;
        compute_health(0, 1, 1)
    });
    let forced_consolidation = health.status == HealthStatus::Critical;
    if forced_consolidation {
        tracing::warn!(
            records = health.tier1_records,
            "critical memory pressure, forcing consolidation"
        );
    }

    let archive_days = engine.config().archival.archive_after_days;
    let mut archive = ArchiveReport::default();
    let mut budget_actions = Vec::new();

    match engine.all_agents() {
        Ok(agents) => {
            for ci_id in &agents {
                match engine.archive_older_than(ci_id, archive_days) {
                    Ok(report) => {
                        archive.records_archived += report.records_archived;
                        archive.digests_written += report.digests_written;
                        archive.skipped_pinned += report.skipped_pinned;
                        archive.skipped_hot += report.skipped_hot;
                    }
                    Err(e) => {
                        tracing::warn!(ci_id = %ci_id, "auto consolidation failed: {}", e);
                        errors += 1;
                    }
                }
            }

            if let Err(e) = engine.flush() {
                tracing::warn!("tier1 flush failed: {}", e);
                errors += 1;
            }

            for ci_id in &agents {
                match engine.budget_tick(ci_id) {
                    Ok(action) => {
                        if action != BudgetAction::None {
                            budget_actions.push((ci_id.clone(), action));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(ci_id = %ci_id, "budget tick failed: {}", e);
                        errors += 1;
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!("agent listing failed, skipping consolidation: {}", e);
            errors += 1;
        }
    }

    let bus_cleanup = engine.bus().cleanup().unwrap_or_else(|e| {
        tracing::warn!("bus cleanup failed: {}", e);
        errors += 1;
        BusCleanup::default()
    });

    tracing::info!(
        status = %health.status,
        archived = archive.records_archived,
        errors,
        "maintenance tick complete"
    );

    MaintenanceReport {
        health,
        forced_consolidation,
        archive,
        budget_actions,
        bus_cleanup,
        errors,
    }
}

/// Spawn the periodic maintenance task (default 6-hour cadence, taken from
/// engine config). The task never terminates the process; drop the handle
/// or abort it to stop.
pub fn spawn(engine: Arc<Katra>) -> tokio::task::JoinHandle<()> {
    let interval_secs = engine.config().maintenance_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs.max(1)));
        // First tick fires immediately; skip it so open() stays cheap
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let engine = Arc::clone(&engine);
            let report =
                tokio::task::spawn_blocking(move || run_once(&engine)).await;
            match report {
                Ok(report) if report.errors > 0 => {
                    tracing::warn!(errors = report.errors, "maintenance tick had failures");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("maintenance task panicked: {}", e),
            }
        }
    })
}

// ============================================================================
// TESTS
// ============================================================================
