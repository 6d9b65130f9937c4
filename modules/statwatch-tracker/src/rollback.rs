//! Two-phase correction of Known State toward upstream truth.
//!
//! `begin_scan` takes the process-wide rollback lock (failing fast if it is
//! held), compares upstream values against Known State and stages every
//! category that upstream reports lower. The lock stays held while entries
//! are staged, so no second scan can start until the staged set is committed
//! or discarded.
//!
//! ```text
//! Idle --begin_scan--> Scanning --(empty)--> Idle
//!                          |
//!                          +--(findings)--> Staged --commit--> Committing --> Idle
//!                                              |
//!                                              +--discard--> Idle
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use statwatch_common::{Category, CategoryGroup, EntityId};

use crate::anomaly::AnomalyTracker;
use crate::state::StateStore;
use crate::traits::{StatsPersistence, StatsSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    #[error("rollback in progress, try again later")]
    InProgress,

    #[error("no rollback is staged")]
    NothingStaged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackScope {
    Entity(EntityId),
    AllTracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPhase {
    Idle,
    Scanning,
    Staged,
    Committing,
}

impl fmt::Display for RollbackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackPhase::Idle => write!(f, "idle"),
            RollbackPhase::Scanning => write!(f, "scanning"),
            RollbackPhase::Staged => write!(f, "staged"),
            RollbackPhase::Committing => write!(f, "committing"),
        }
    }
}

/// One staged write: replace `known` with the current upstream `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedCorrection {
    pub entity: EntityId,
    pub category: Category,
    pub known: u64,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    NothingToRollBack,
    Staged(Vec<StagedCorrection>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub corrections: Vec<StagedCorrection>,
    pub entities: usize,
    /// Corrections skipped because Known State moved after the scan.
    pub superseded: usize,
    pub persist_failures: usize,
}

impl fmt::Display for CommitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "corrections={} entities={} superseded={} persist_failures={}",
            self.corrections.len(),
            self.entities,
            self.superseded,
            self.persist_failures
        )
    }
}

struct StagedRollback {
    // Held until commit or discard; dropping it releases the rollback lock.
    _guard: OwnedMutexGuard<()>,
    entries: Vec<StagedCorrection>,
}

struct Inner {
    phase: RollbackPhase,
    staged: Option<StagedRollback>,
}

pub struct RollbackCoordinator {
    lock: Arc<tokio::sync::Mutex<()>>,
    inner: Mutex<Inner>,
}

impl Default for RollbackCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackCoordinator {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            inner: Mutex::new(Inner {
                phase: RollbackPhase::Idle,
                staged: None,
            }),
        }
    }

    pub fn phase(&self) -> RollbackPhase {
        self.inner().phase
    }

    /// Entries awaiting commit, for audit.
    pub fn staged(&self) -> Vec<StagedCorrection> {
        self.inner()
            .staged
            .as_ref()
            .map(|s| s.entries.clone())
            .unwrap_or_default()
    }

    /// Scan `scope` and stage corrections.
    ///
    /// Fails with `InProgress` without touching anything if another scan or
    /// staged rollback holds the lock. Per-entity fetch failures are logged
    /// and that entity is skipped.
    pub async fn begin_scan(
        &self,
        scope: RollbackScope,
        source: &dyn StatsSource,
        state: &StateStore,
    ) -> Result<ScanOutcome, RollbackError> {
        let guard = self
            .lock
            .clone()
            .try_lock_owned()
            .map_err(|_| RollbackError::InProgress)?;
        self.inner().phase = RollbackPhase::Scanning;

        let mut entities: Vec<EntityId> = match scope {
            RollbackScope::Entity(id) => vec![id],
            RollbackScope::AllTracked => state.ids().cloned().collect(),
        };
        entities.sort();
        info!(entities = entities.len(), "Rollback scan started");

        let mut entries = Vec::new();
        for id in &entities {
            let Some(known) = state.get(id) else {
                warn!(entity = %id, "Skipping rollback scan for entity with no known state");
                continue;
            };

            let snapshot = match source.fetch_snapshot(id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(entity = %id, error = %e, "Rollback scan fetch failed, skipping entity");
                    continue;
                }
            };

            for (&category, &upstream) in snapshot.values() {
                match known.get(category) {
                    Some(current) if upstream < current => entries.push(StagedCorrection {
                        entity: id.clone(),
                        category,
                        known: current,
                        value: upstream,
                    }),
                    _ => {}
                }
            }
        }

        let mut inner = self.inner();
        if entries.is_empty() {
            inner.phase = RollbackPhase::Idle;
            drop(guard);
            info!("Rollback scan found nothing to roll back");
            return Ok(ScanOutcome::NothingToRollBack);
        }

        info!(corrections = entries.len(), "Rollback staged");
        inner.phase = RollbackPhase::Staged;
        inner.staged = Some(StagedRollback {
            _guard: guard,
            entries: entries.clone(),
        });
        Ok(ScanOutcome::Staged(entries))
    }

    /// Apply every staged correction, clear strikes for affected entities and
    /// persist the corrected values. A correction whose Known State no longer
    /// matches the value it was staged against is skipped as superseded.
    /// Persistence failures are logged and counted; Known State is corrected
    /// regardless.
    pub async fn commit(
        &self,
        state: &mut StateStore,
        anomalies: &mut AnomalyTracker,
        persistence: &dyn StatsPersistence,
        now: DateTime<Utc>,
    ) -> Result<CommitReport, RollbackError> {
        let staged = {
            let mut inner = self.inner();
            let staged = inner.staged.take().ok_or(RollbackError::NothingStaged)?;
            inner.phase = RollbackPhase::Committing;
            staged
        };

        let StagedRollback { _guard, entries } = staged;
        let mut applied = Vec::with_capacity(entries.len());
        let mut superseded = 0;
        let mut writes: BTreeMap<(EntityId, CategoryGroup), BTreeMap<Category, u64>> =
            BTreeMap::new();
        for entry in entries {
            let Some(known) = state.get(&entry.entity) else {
                warn!(entity = %entry.entity, "Dropping correction for untracked entity");
                continue;
            };
            // The tick loop keeps running while entries are staged.
            let current = known.get(entry.category);
            if current != Some(entry.known) {
                warn!(
                    entity = %entry.entity,
                    category = %entry.category,
                    staged_against = entry.known,
                    current = ?current,
                    "Skipping superseded rollback correction"
                );
                superseded += 1;
                continue;
            }
            state.set_value(&entry.entity, entry.category, entry.value, now);
            anomalies.clear(&entry.entity);
            writes
                .entry((entry.entity.clone(), entry.category.group()))
                .or_default()
                .insert(entry.category, entry.value);
            applied.push(entry);
        }

        let mut report = CommitReport {
            entities: writes
                .keys()
                .map(|(id, _)| id)
                .collect::<std::collections::BTreeSet<_>>()
                .len(),
            superseded,
            ..Default::default()
        };
        for ((id, group), values) in &writes {
            if let Err(e) = persistence.persist_category_values(id, *group, values).await {
                warn!(entity = %id, group = %group, error = %e, "Failed to persist rollback correction");
                report.persist_failures += 1;
            }
        }

        report.corrections = applied;
        self.inner().phase = RollbackPhase::Idle;
        drop(_guard);

        info!(%report, "Rollback committed");
        Ok(report)
    }

    /// Drop the staged entries without touching Known State.
    pub fn discard(&self) -> Result<usize, RollbackError> {
        let mut inner = self.inner();
        let staged = inner.staged.take().ok_or(RollbackError::NothingStaged)?;
        inner.phase = RollbackPhase::Idle;
        info!(corrections = staged.entries.len(), "Rollback discarded");
        Ok(staged.entries.len())
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
