use std::collections::HashMap;

use statwatch_common::EntityId;

pub const DEFAULT_ROLLBACK_STRIKE_THRESHOLD: u32 = 20;

/// Per-entity anomaly strikes. Process-lifetime only; never persisted.
#[derive(Debug)]
pub struct AnomalyTracker {
    strikes: HashMap<EntityId, u32>,
    threshold: u32,
}

impl Default for AnomalyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLBACK_STRIKE_THRESHOLD)
    }
}

impl AnomalyTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            strikes: HashMap::new(),
            threshold: threshold.max(1),
        }
    }

    /// Record one anomaly. Returns the new strike count.
    pub fn record_anomaly(&mut self, id: &EntityId) -> u32 {
        let count = self.strikes.entry(id.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn clear(&mut self, id: &EntityId) {
        self.strikes.remove(id);
    }

    pub fn strikes(&self, id: &EntityId) -> u32 {
        self.strikes.get(id).copied().unwrap_or(0)
    }

    pub fn is_eligible_for_rollback(&self, id: &EntityId) -> bool {
        self.strikes(id) >= self.threshold
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
