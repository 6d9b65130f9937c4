use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, trace};

use statwatch_common::EntityId;

pub const DEFAULT_INACTIVITY_THRESHOLD_DAYS: i64 = 7;
pub const DEFAULT_MAX_ACTIVE_INTERVAL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Active,
    Inactive,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Active => write!(f, "active"),
            Tier::Inactive => write!(f, "inactive"),
        }
    }
}

/// Decides which tracked entity to poll next.
///
/// Entities live in exactly one of two round-robin rotations. Out of every
/// `N = min(max_interval, 1 + |active|)` draws, one comes from the inactive
/// rotation and the rest from the active one, so inactive entities are never
/// starved and get polled every tick when nothing is active.
///
/// Tiers are re-evaluated lazily: an entity is moved only when it is drawn,
/// or immediately when `mark_active` makes an inactive entity fresh.
pub struct TieredScheduler {
    active: VecDeque<EntityId>,
    inactive: VecDeque<EntityId>,
    membership: HashMap<EntityId, Tier>,
    last_active: HashMap<EntityId, DateTime<Utc>>,
    counter: usize,
    inactivity_threshold: Duration,
    max_interval: usize,
}

impl Default for TieredScheduler {
    fn default() -> Self {
        Self::new(
            Duration::days(DEFAULT_INACTIVITY_THRESHOLD_DAYS),
            DEFAULT_MAX_ACTIVE_INTERVAL,
        )
    }
}

impl TieredScheduler {
    pub fn new(inactivity_threshold: Duration, max_interval: usize) -> Self {
        Self {
            active: VecDeque::new(),
            inactive: VecDeque::new(),
            membership: HashMap::new(),
            last_active: HashMap::new(),
            counter: 0,
            inactivity_threshold,
            max_interval: max_interval.max(1),
        }
    }

    /// Register an entity in the inactive rotation. No-op if already tracked.
    pub fn add(&mut self, id: EntityId) -> bool {
        if self.membership.contains_key(&id) {
            return false;
        }
        self.membership.insert(id.clone(), Tier::Inactive);
        self.inactive.push_back(id);
        true
    }

    pub fn remove(&mut self, id: &EntityId) -> bool {
        let Some(tier) = self.membership.remove(id) else {
            return false;
        };
        let rotation = self.rotation_mut(tier);
        if let Some(pos) = rotation.iter().position(|e| e == id) {
            rotation.remove(pos);
        }
        self.last_active.remove(id);
        true
    }

    /// Next entity to poll, or `None` when nothing is tracked.
    pub fn next(&mut self, now: DateTime<Utc>) -> Option<EntityId> {
        if self.membership.is_empty() {
            return None;
        }

        let interval = self.interval();
        self.counter = (self.counter + 1) % interval;
        let preferred = if self.counter == 0 {
            Tier::Inactive
        } else {
            Tier::Active
        };

        let (drawn_from, id) = match self.rotation_mut(preferred).pop_front() {
            Some(id) => (preferred, id),
            None => {
                let fallback = match preferred {
                    Tier::Active => Tier::Inactive,
                    Tier::Inactive => Tier::Active,
                };
                (fallback, self.rotation_mut(fallback).pop_front()?)
            }
        };

        let tier = self.classify(&id, now);
        if tier != drawn_from {
            info!(entity = %id, from = %drawn_from, to = %tier, "Re-tiered entity");
            self.membership.insert(id.clone(), tier);
        }
        trace!(entity = %id, tier = %tier, interval, "Scheduler draw");
        self.rotation_mut(tier).push_back(id.clone());

        Some(id)
    }

    /// Record a positive-activity signal at `at`.
    ///
    /// Promotes an inactive entity immediately when `at` is within the
    /// activity window. Returns true if the entity was promoted. Untracked
    /// ids are ignored.
    pub fn mark_active(&mut self, id: &EntityId, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let Some(&tier) = self.membership.get(id) else {
            return false;
        };

        let latest = self
            .last_active
            .entry(id.clone())
            .and_modify(|t| *t = (*t).max(at))
            .or_insert(at);
        let latest = *latest;

        if tier == Tier::Inactive && self.is_fresh(latest, now) {
            if let Some(pos) = self.inactive.iter().position(|e| e == id) {
                self.inactive.remove(pos);
            }
            self.active.push_back(id.clone());
            self.membership.insert(id.clone(), Tier::Active);
            info!(entity = %id, "Promoted entity to active");
            return true;
        }
        false
    }

    pub fn tier_of(&self, id: &EntityId) -> Option<Tier> {
        self.membership.get(id).copied()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.membership.contains_key(id)
    }

    pub fn last_active(&self, id: &EntityId) -> Option<DateTime<Utc>> {
        self.last_active.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn inactive_len(&self) -> usize {
        self.inactive.len()
    }

    /// Current draw interval `N`.
    pub fn interval(&self) -> usize {
        self.max_interval.min(1 + self.active.len())
    }

    fn classify(&self, id: &EntityId, now: DateTime<Utc>) -> Tier {
        match self.last_active.get(id) {
            Some(&at) if self.is_fresh(at, now) => Tier::Active,
            _ => Tier::Inactive,
        }
    }

    fn is_fresh(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(at) < self.inactivity_threshold
    }

    fn rotation_mut(&mut self, tier: Tier) -> &mut VecDeque<EntityId> {
        match tier {
            Tier::Active => &mut self.active,
            Tier::Inactive => &mut self.inactive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id(name: &str) -> EntityId {
        EntityId::new(name).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn scheduler_with(names: &[&str]) -> TieredScheduler {
        let mut scheduler = TieredScheduler::default();
        for name in names {
            scheduler.add(id(name));
        }
        scheduler
    }

    #[test]
    fn empty_scheduler_yields_nothing() {
        let mut scheduler = TieredScheduler::default();
        assert_eq!(scheduler.next(now()), None);
    }

    #[test]
    fn add_is_idempotent() {
        let mut scheduler = TieredScheduler::default();
        assert!(scheduler.add(id("a")));
        assert!(!scheduler.add(id("A")));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.tier_of(&id("a")), Some(Tier::Inactive));
    }

    #[test]
    fn remove_reports_whether_entity_was_tracked() {
        let mut scheduler = scheduler_with(&["a", "b"]);
        assert!(scheduler.remove(&id("a")));
        assert!(!scheduler.remove(&id("a")));
        assert_eq!(scheduler.next(now()), Some(id("b")));
        assert_eq!(scheduler.next(now()), Some(id("b")));
    }

    #[test]
    fn inactive_only_rotation_is_round_robin() {
        let names = ["a", "b", "c", "d", "e"];
        let mut scheduler = scheduler_with(&names);

        let drawn: Vec<EntityId> = (0..5).filter_map(|_| scheduler.next(now())).collect();
        let expected: Vec<EntityId> = names.iter().map(|n| id(n)).collect();
        assert_eq!(drawn, expected);

        // Second lap repeats insertion order.
        assert_eq!(scheduler.next(now()), Some(id("a")));
    }

    #[test]
    fn mark_active_promotes_immediately() {
        let mut scheduler = scheduler_with(&["a", "b"]);
        let b = id("b");

        assert!(scheduler.mark_active(&b, now(), now()));
        assert_eq!(scheduler.tier_of(&b), Some(Tier::Active));
        assert_eq!(scheduler.active_len(), 1);
        assert_eq!(scheduler.inactive_len(), 1);
    }

    #[test]
    fn stale_activity_does_not_promote() {
        let mut scheduler = scheduler_with(&["a"]);
        let a = id("a");
        let stale = now() - Duration::days(DEFAULT_INACTIVITY_THRESHOLD_DAYS + 1);

        assert!(!scheduler.mark_active(&a, stale, now()));
        assert_eq!(scheduler.tier_of(&a), Some(Tier::Inactive));
    }

    #[test]
    fn mark_active_ignores_untracked_entities() {
        let mut scheduler = TieredScheduler::default();
        assert!(!scheduler.mark_active(&id("ghost"), now(), now()));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn active_entities_are_drawn_more_often() {
        let mut scheduler = scheduler_with(&["a1", "a2", "i1", "i2"]);
        scheduler.mark_active(&id("a1"), now(), now());
        scheduler.mark_active(&id("a2"), now(), now());
        assert_eq!(scheduler.interval(), 3);

        let drawn: Vec<EntityId> = (0..6).filter_map(|_| scheduler.next(now())).collect();
        assert_eq!(
            drawn,
            vec![id("a1"), id("a2"), id("i1"), id("a1"), id("a2"), id("i2")]
        );
    }

    #[test]
    fn interval_is_capped() {
        let names: Vec<String> = (0..20).map(|n| format!("p{n}")).collect();
        let mut scheduler = TieredScheduler::default();
        for name in &names {
            let e = id(name);
            scheduler.add(e.clone());
            scheduler.mark_active(&e, now(), now());
        }
        assert_eq!(scheduler.interval(), DEFAULT_MAX_ACTIVE_INTERVAL);
    }

    #[test]
    fn stale_active_entity_is_demoted_when_drawn() {
        let mut scheduler = scheduler_with(&["a"]);
        let a = id("a");
        scheduler.mark_active(&a, now(), now());

        let later = now() + Duration::days(DEFAULT_INACTIVITY_THRESHOLD_DAYS + 1);
        assert_eq!(scheduler.next(later), Some(a.clone()));
        assert_eq!(scheduler.tier_of(&a), Some(Tier::Inactive));
        assert_eq!(scheduler.active_len(), 0);
    }

    #[test]
    fn falls_back_to_other_rotation_when_preferred_is_empty() {
        let mut scheduler = scheduler_with(&["a"]);
        let a = id("a");
        scheduler.mark_active(&a, now(), now());
        assert_eq!(scheduler.interval(), 2);

        // Every draw must yield the single active entity, including the
        // draws that prefer the (empty) inactive rotation.
        for _ in 0..4 {
            assert_eq!(scheduler.next(now()), Some(a.clone()));
        }
    }
}
