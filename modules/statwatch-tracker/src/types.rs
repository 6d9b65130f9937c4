use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use statwatch_common::{Category, CategoryGroup, EntityId};

use crate::rollback::{RollbackPhase, StagedCorrection};

/// Confirmed positive change for one category group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaNotice {
    pub entity: EntityId,
    pub group: CategoryGroup,
    /// Positive change per category.
    pub deltas: BTreeMap<Category, u64>,
    /// New value per changed category.
    pub values: BTreeMap<Category, u64>,
}

/// Informational notice after a rollback commit. Never a "stat gained" message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackNotice {
    pub corrections: Vec<StagedCorrection>,
}

/// What one polling cycle did for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub entity: EntityId,
    pub changed: BTreeMap<CategoryGroup, BTreeMap<Category, u64>>,
    pub silent_drops: usize,
    pub anomalous_groups: Vec<CategoryGroup>,
    pub strikes: u32,
    pub promoted: bool,
    /// Corrections committed by an automatic rollback this cycle.
    pub rolled_back: Option<usize>,
    pub persist_failures: usize,
}

impl UpdateReport {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            changed: BTreeMap::new(),
            silent_drops: 0,
            anomalous_groups: Vec::new(),
            strikes: 0,
            promoted: false,
            rolled_back: None,
            persist_failures: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn delta_count(&self) -> usize {
        self.changed.values().map(BTreeMap::len).sum()
    }
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity={} changed_groups={} deltas={} silent_drops={} anomalies={} strikes={}",
            self.entity,
            self.changed.len(),
            self.delta_count(),
            self.silent_drops,
            self.anomalous_groups.len(),
            self.strikes,
        )?;
        if self.promoted {
            write!(f, " promoted")?;
        }
        if let Some(n) = self.rolled_back {
            write!(f, " rolled_back={n}")?;
        }
        if self.persist_failures > 0 {
            write!(f, " persist_failures={}", self.persist_failures)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    pub disabled: bool,
    pub tracked: usize,
    pub active: usize,
    pub inactive: usize,
    pub rollback_phase: RollbackPhase,
    pub staged_corrections: usize,
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "disabled={} tracked={} (active={}, inactive={}) rollback={} staged={}",
            self.disabled,
            self.tracked,
            self.active,
            self.inactive,
            self.rollback_phase,
            self.staged_corrections,
        )
    }
}
