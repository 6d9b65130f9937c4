use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use statwatch_common::{CategoryGroup, EntityId, FileConfig};

use crate::anomaly::{AnomalyTracker, DEFAULT_ROLLBACK_STRIKE_THRESHOLD};
use crate::diff::{compute_diff, DiffError};
use crate::notify::backend::NotifyBackend;
use crate::rollback::{
    CommitReport, RollbackCoordinator, RollbackError, RollbackScope, ScanOutcome,
    StagedCorrection,
};
use crate::scheduler::{
    TieredScheduler, DEFAULT_INACTIVITY_THRESHOLD_DAYS, DEFAULT_MAX_ACTIVE_INTERVAL,
};
use crate::state::StateStore;
use crate::traits::{FetchError, Membership, StatsPersistence, StatsSource};
use crate::types::{DeltaNotice, RollbackNotice, TrackerStatus, UpdateReport};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker is disabled until manually re-enabled")]
    Disabled,

    #[error("upstream format changed: {0}")]
    UpstreamFormatChanged(String),

    #[error("{0} is not tracked by any subscriber")]
    NotTracked(EntityId),

    #[error("{0} is still tracked by a subscriber")]
    StillTracked(EntityId),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error("persistence error: {0}")]
    Persistence(anyhow::Error),

    #[error("tracker task has stopped")]
    Stopped,
}

/// Tunables for one tracker instance.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub inactivity_threshold: Duration,
    pub max_active_interval: usize,
    pub rollback_strike_threshold: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            inactivity_threshold: Duration::days(DEFAULT_INACTIVITY_THRESHOLD_DAYS),
            max_active_interval: DEFAULT_MAX_ACTIVE_INTERVAL,
            rollback_strike_threshold: DEFAULT_ROLLBACK_STRIKE_THRESHOLD,
        }
    }
}

impl TrackerSettings {
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            inactivity_threshold: config.scheduler.inactivity_threshold(),
            max_active_interval: config.scheduler.max_active_interval,
            rollback_strike_threshold: config.anomaly.rollback_strike_threshold,
        }
    }
}

/// Collaborators injected into the tracker.
#[derive(Clone, TypedBuilder)]
pub struct TrackerDeps {
    pub source: Arc<dyn StatsSource>,
    pub persistence: Arc<dyn StatsPersistence>,
    pub notifier: Arc<dyn NotifyBackend>,
    pub membership: Arc<dyn Membership>,
    #[builder(default)]
    pub settings: TrackerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// First successful fetch; written straight into Known State.
    Primed,
    Updated(UpdateReport),
    NotOnListing,
    TransientFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing tracked.
    Skipped,
    Disabled,
    Polled {
        entity: EntityId,
        outcome: UpdateOutcome,
    },
}

/// Drives polling cycles. Owns the scheduler, Known State, strikes and the
/// rollback coordinator; every mutation of those goes through `&mut self`.
pub struct Tracker {
    deps: TrackerDeps,
    scheduler: TieredScheduler,
    state: StateStore,
    anomalies: AnomalyTracker,
    rollback: RollbackCoordinator,
    disabled: bool,
}

impl Tracker {
    pub fn new(deps: TrackerDeps) -> Self {
        let settings = deps.settings.clone();
        Self {
            deps,
            scheduler: TieredScheduler::new(
                settings.inactivity_threshold,
                settings.max_active_interval,
            ),
            state: StateStore::new(),
            anomalies: AnomalyTracker::new(settings.rollback_strike_threshold),
            rollback: RollbackCoordinator::new(),
            disabled: false,
        }
    }

    /// Rebuild Known State and tiers from persistence. Returns the entity count.
    pub async fn hydrate(&mut self, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        let states = self
            .deps
            .persistence
            .load_known_states()
            .await
            .map_err(TrackerError::Persistence)?;

        let count = states.len();
        for (id, known) in states {
            self.scheduler.add(id.clone());
            if let Some(at) = known.last_active {
                self.scheduler.mark_active(&id, at, now);
            }
            self.state.insert(id, known);
        }

        info!(
            entities = count,
            active = self.scheduler.active_len(),
            inactive = self.scheduler.inactive_len(),
            "Hydrated tracker"
        );
        Ok(count)
    }

    /// Start polling an entity. Only accepted while a subscriber tracks it.
    pub async fn track(&mut self, id: EntityId) -> Result<bool, TrackerError> {
        let tracked = self
            .deps
            .membership
            .is_tracked(&id)
            .await
            .map_err(TrackerError::Persistence)?;
        if !tracked {
            return Err(TrackerError::NotTracked(id));
        }

        let added = self.scheduler.add(id.clone());
        if added {
            info!(entity = %id, "Tracking entity");
        }
        Ok(added)
    }

    /// Stop polling an entity once no subscriber tracks it, dropping its
    /// Known State, strikes and persisted rows.
    pub async fn untrack(&mut self, id: &EntityId) -> Result<bool, TrackerError> {
        let tracked = self
            .deps
            .membership
            .is_tracked(id)
            .await
            .map_err(TrackerError::Persistence)?;
        if tracked {
            return Err(TrackerError::StillTracked(id.clone()));
        }

        let removed = self.scheduler.remove(id);
        self.state.remove(id);
        self.anomalies.clear(id);
        self.deps
            .persistence
            .delete_entity(id)
            .await
            .map_err(TrackerError::Persistence)?;

        info!(entity = %id, removed, "Untracked entity");
        Ok(removed)
    }

    /// One scheduler tick: pick the next entity and update it.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<CycleOutcome, TrackerError> {
        if self.disabled {
            return Ok(CycleOutcome::Disabled);
        }
        let Some(entity) = self.scheduler.next(now) else {
            return Ok(CycleOutcome::Skipped);
        };
        let outcome = self.update_entity(&entity, now).await?;
        Ok(CycleOutcome::Polled { entity, outcome })
    }

    /// Fetch, diff, notify and persist one entity.
    pub async fn update_entity(
        &mut self,
        id: &EntityId,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome, TrackerError> {
        if self.disabled {
            return Err(TrackerError::Disabled);
        }

        let snapshot = match self.deps.source.fetch_snapshot(id).await {
            Ok(snapshot) => snapshot,
            Err(FetchError::FormatChanged(msg)) => {
                self.disabled = true;
                error!(entity = %id, error = %msg, "Upstream format changed, disabling tracker");
                return Err(TrackerError::UpstreamFormatChanged(msg));
            }
            Err(FetchError::NotFound) => {
                self.record_listing_status(id, false).await;
                debug!(entity = %id, "Entity not on listing");
                return Ok(UpdateOutcome::NotOnListing);
            }
            Err(FetchError::Transient(msg)) => {
                warn!(entity = %id, error = %msg, "Transient fetch failure");
                return Ok(UpdateOutcome::TransientFailure(msg));
            }
        };

        let Some(known) = self.state.get(id).cloned() else {
            self.state.prime(id, &snapshot);
            for group in CategoryGroup::ALL {
                let values = snapshot.group_values(group);
                if values.is_empty() {
                    continue;
                }
                if let Err(e) = self
                    .deps
                    .persistence
                    .persist_category_values(id, group, &values)
                    .await
                {
                    warn!(entity = %id, group = %group, error = %e, "Failed to persist primed values");
                }
            }
            info!(entity = %id, categories = snapshot.len(), "Primed entity");
            return Ok(UpdateOutcome::Primed);
        };

        if !known.on_listing {
            self.record_listing_status(id, true).await;
        }

        let mut report = UpdateReport::new(id.clone());

        for group in CategoryGroup::ALL {
            let before = known.group_values(group);
            let mut after = snapshot.group_values(group);
            // Categories that fell off the listing keep their known value.
            for (category, value) in &before {
                if !after.contains_key(category) {
                    debug!(entity = %id, category = %category, "Carrying forward missing category");
                    after.insert(*category, *value);
                }
            }

            let diff = match compute_diff(&before, &after, group.baseline()) {
                Ok(diff) => diff,
                Err(DiffError::NegativeDelta {
                    category,
                    before,
                    after,
                }) => {
                    let strikes = self.anomalies.record_anomaly(id);
                    debug!(
                        entity = %id,
                        group = %group,
                        category = %category,
                        before,
                        after,
                        strikes,
                        "Negative delta anomaly"
                    );
                    report.anomalous_groups.push(group);
                    continue;
                }
                Err(e @ DiffError::MissingCategory { .. }) => {
                    error!(entity = %id, group = %group, error = %e, "Diff precondition violated");
                    continue;
                }
            };

            for silent in &diff.silent_drops {
                debug!(entity = %id, category = %silent.category, before = silent.before, "Silent drop");
            }
            report.silent_drops += diff.silent_drops.len();

            if diff.is_empty() {
                continue;
            }
            self.anomalies.clear(id);
            for category in diff.deltas.keys() {
                if let Some(&value) = after.get(category) {
                    self.state.set_value(id, *category, value, now);
                }
            }
            report.changed.insert(group, diff.deltas);
        }

        if report.is_active() {
            report.promoted = self.scheduler.mark_active(id, now, now);
            self.state.set_last_active(id, now);
            if let Err(e) = self
                .deps
                .persistence
                .persist_activity_timestamp(id, now)
                .await
            {
                warn!(entity = %id, error = %e, "Failed to persist activity timestamp");
                report.persist_failures += 1;
            }
        }

        if self.anomalies.is_eligible_for_rollback(id) {
            info!(
                entity = %id,
                strikes = self.anomalies.strikes(id),
                "Strike threshold reached, rolling back entity"
            );
            match self.auto_rollback(id, now).await {
                Ok(corrections) => report.rolled_back = Some(corrections),
                Err(e) => warn!(entity = %id, error = %e, "Automatic rollback failed"),
            }
            self.anomalies.clear(id);
        }
        report.strikes = self.anomalies.strikes(id);

        let changed: Vec<(CategoryGroup, BTreeMap<_, _>)> = report
            .changed
            .iter()
            .map(|(group, deltas)| (*group, deltas.clone()))
            .collect();
        for (group, deltas) in changed {
            let Some(current) = self.state.get(id) else {
                continue;
            };
            let values: BTreeMap<_, _> = deltas
                .keys()
                .filter_map(|c| current.get(*c).map(|v| (*c, v)))
                .collect();

            if let Err(e) = self
                .deps
                .persistence
                .persist_category_values(id, group, &values)
                .await
            {
                warn!(entity = %id, group = %group, error = %e, "Failed to persist category values");
                report.persist_failures += 1;
            }

            let notice = DeltaNotice {
                entity: id.clone(),
                group,
                deltas,
                values,
            };
            if let Err(e) = self.deps.notifier.send_delta(&notice).await {
                warn!(entity = %id, group = %group, error = %e, "Failed to send delta notification");
            }
        }

        info!(%report, "Updated entity");
        Ok(UpdateOutcome::Updated(report))
    }

    pub async fn begin_rollback(&mut self, scope: RollbackScope) -> Result<ScanOutcome, TrackerError> {
        Ok(self
            .rollback
            .begin_scan(scope, self.deps.source.as_ref(), &self.state)
            .await?)
    }

    pub fn staged_rollback(&self) -> Vec<StagedCorrection> {
        self.rollback.staged()
    }

    pub async fn commit_rollback(&mut self, now: DateTime<Utc>) -> Result<CommitReport, TrackerError> {
        let report = self
            .rollback
            .commit(
                &mut self.state,
                &mut self.anomalies,
                self.deps.persistence.as_ref(),
                now,
            )
            .await?;

        if report.corrections.is_empty() {
            return Ok(report);
        }
        let notice = RollbackNotice {
            corrections: report.corrections.clone(),
        };
        if let Err(e) = self.deps.notifier.send_rollback_notice(&notice).await {
            warn!(error = %e, "Failed to send rollback notice");
        }
        Ok(report)
    }

    pub fn discard_rollback(&self) -> Result<usize, TrackerError> {
        Ok(self.rollback.discard()?)
    }

    /// Clear the disabled flag set by an upstream format change.
    pub fn enable(&mut self) {
        if self.disabled {
            info!("Tracker re-enabled");
        }
        self.disabled = false;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            disabled: self.disabled,
            tracked: self.scheduler.len(),
            active: self.scheduler.active_len(),
            inactive: self.scheduler.inactive_len(),
            rollback_phase: self.rollback.phase(),
            staged_corrections: self.rollback.staged().len(),
        }
    }

    pub fn scheduler(&self) -> &TieredScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn anomalies(&self) -> &AnomalyTracker {
        &self.anomalies
    }

    /// Scan and commit a single entity. Returns the number of corrections.
    async fn auto_rollback(&mut self, id: &EntityId, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        match self.begin_rollback(RollbackScope::Entity(id.clone())).await? {
            ScanOutcome::NothingToRollBack => Ok(0),
            ScanOutcome::Staged(_) => Ok(self.commit_rollback(now).await?.corrections.len()),
        }
    }

    async fn record_listing_status(&mut self, id: &EntityId, on_listing: bool) {
        let Some(known) = self.state.get(id) else {
            return;
        };
        if known.on_listing == on_listing {
            return;
        }
        self.state.set_on_listing(id, on_listing);
        if let Err(e) = self
            .deps
            .persistence
            .persist_listing_status(id, on_listing)
            .await
        {
            warn!(entity = %id, error = %e, "Failed to persist listing status");
        }
    }
}
