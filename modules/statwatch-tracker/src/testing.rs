// Test mocks for the tracker.
//
// One mock per collaborator boundary:
// - MockSource (StatsSource) - per-entity canned snapshot or error
// - MemoryPersistence (StatsPersistence) - in-memory rows plus a write log
// - RecordingNotifier (NotifyBackend) - captures every notice
// - StaticMembership (Membership) - mutable set of tracked ids

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use statwatch_common::{Category, CategoryGroup, EntityId, KnownState, Snapshot};

use crate::notify::backend::NotifyBackend;
use crate::traits::{FetchError, Membership, StatsPersistence, StatsSource};
use crate::types::{DeltaNotice, RollbackNotice};

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

type Response = std::result::Result<BTreeMap<Category, u64>, FetchError>;

/// Returns the registered response for each entity, every time it is asked.
/// Queued one-shot responses are served first. Unregistered entities fail
/// with `Transient`. Each fetch yields once so concurrent callers interleave.
pub struct MockSource {
    responses: Mutex<HashMap<EntityId, Response>>,
    queued: Mutex<HashMap<EntityId, VecDeque<Response>>>,
    fetched: Mutex<Vec<EntityId>>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn on_values(self, id: &EntityId, values: &[(Category, u64)]) -> Self {
        self.set_values(id, values);
        self
    }

    pub fn on_error(self, id: &EntityId, error: FetchError) -> Self {
        self.set_error(id, error);
        self
    }

    /// Replace the response for `id`.
    pub fn set_values(&self, id: &EntityId, values: &[(Category, u64)]) {
        self.responses
            .lock()
            .unwrap()
            .insert(id.clone(), Ok(values.iter().copied().collect()));
    }

    pub fn set_error(&self, id: &EntityId, error: FetchError) {
        self.responses
            .lock()
            .unwrap()
            .insert(id.clone(), Err(error));
    }

    /// Serve `values` for the next fetch of `id` only.
    pub fn queue_values(&self, id: &EntityId, values: &[(Category, u64)]) {
        self.queued
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_default()
            .push_back(Ok(values.iter().copied().collect()));
    }

    /// Every id fetched so far, in call order.
    pub fn fetched(&self) -> Vec<EntityId> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatsSource for MockSource {
    async fn fetch_snapshot(&self, id: &EntityId) -> std::result::Result<Snapshot, FetchError> {
        tokio::task::yield_now().await;
        self.fetched.lock().unwrap().push(id.clone());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        let response = queued.or_else(|| self.responses.lock().unwrap().get(id).cloned());
        match response {
            Some(Ok(values)) => Ok(Snapshot::new(values, Utc::now())),
            Some(Err(e)) => Err(e),
            None => Err(FetchError::Transient(format!("no response registered for {id}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryPersistence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryWrite {
    pub entity: EntityId,
    pub group: CategoryGroup,
    pub values: BTreeMap<Category, u64>,
}

#[derive(Default)]
struct Rows {
    states: HashMap<EntityId, KnownState>,
    writes: Vec<CategoryWrite>,
    deleted: Vec<EntityId>,
}

/// In-memory stand-in for the Postgres store.
#[derive(Default)]
pub struct MemoryPersistence {
    rows: Mutex<Rows>,
    fail_writes: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a persisted entity, as if written by a previous run.
    pub fn with_state(self, id: &EntityId, state: KnownState) -> Self {
        self.rows.lock().unwrap().states.insert(id.clone(), state);
        self
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn value(&self, id: &EntityId, category: Category) -> Option<u64> {
        self.rows
            .lock()
            .unwrap()
            .states
            .get(id)
            .and_then(|s| s.get(category))
    }

    pub fn last_active(&self, id: &EntityId) -> Option<DateTime<Utc>> {
        self.rows
            .lock()
            .unwrap()
            .states
            .get(id)
            .and_then(|s| s.last_active)
    }

    pub fn on_listing(&self, id: &EntityId) -> Option<bool> {
        self.rows
            .lock()
            .unwrap()
            .states
            .get(id)
            .map(|s| s.on_listing)
    }

    pub fn writes(&self) -> Vec<CategoryWrite> {
        self.rows.lock().unwrap().writes.clone()
    }

    pub fn deleted(&self) -> Vec<EntityId> {
        self.rows.lock().unwrap().deleted.clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated persistence failure");
        }
        Ok(())
    }
}

fn empty_state() -> KnownState {
    KnownState {
        values: BTreeMap::new(),
        last_updated: Utc::now(),
        last_active: None,
        on_listing: true,
    }
}

#[async_trait]
impl StatsPersistence for MemoryPersistence {
    async fn persist_category_values(
        &self,
        id: &EntityId,
        group: CategoryGroup,
        values: &BTreeMap<Category, u64>,
    ) -> Result<()> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        let state = rows.states.entry(id.clone()).or_insert_with(empty_state);
        for (category, value) in values {
            state.set(*category, *value);
        }
        state.last_updated = Utc::now();
        rows.writes.push(CategoryWrite {
            entity: id.clone(),
            group,
            values: values.clone(),
        });
        Ok(())
    }

    async fn persist_activity_timestamp(&self, id: &EntityId, at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        rows.states
            .entry(id.clone())
            .or_insert_with(empty_state)
            .last_active = Some(at);
        Ok(())
    }

    async fn persist_listing_status(&self, id: &EntityId, on_listing: bool) -> Result<()> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        rows.states
            .entry(id.clone())
            .or_insert_with(empty_state)
            .on_listing = on_listing;
        Ok(())
    }

    async fn load_known_states(&self) -> Result<Vec<(EntityId, KnownState)>> {
        let rows = self.rows.lock().unwrap();
        let mut states: Vec<(EntityId, KnownState)> = rows
            .states
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(states)
    }

    async fn delete_entity(&self, id: &EntityId) -> Result<()> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        rows.states.remove(id);
        rows.deleted.push(id.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    deltas: Mutex<Vec<DeltaNotice>>,
    rollbacks: Mutex<Vec<RollbackNotice>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records nothing and fails every send.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn deltas(&self) -> Vec<DeltaNotice> {
        self.deltas.lock().unwrap().clone()
    }

    pub fn rollbacks(&self) -> Vec<RollbackNotice> {
        self.rollbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotifier {
    async fn send_delta(&self, notice: &DeltaNotice) -> Result<()> {
        if self.fail {
            bail!("simulated notification failure");
        }
        self.deltas.lock().unwrap().push(notice.clone());
        Ok(())
    }

    async fn send_rollback_notice(&self, notice: &RollbackNotice) -> Result<()> {
        if self.fail {
            bail!("simulated notification failure");
        }
        self.rollbacks.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticMembership
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StaticMembership {
    tracked: Mutex<HashSet<EntityId>>,
}

impl StaticMembership {
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a EntityId>) -> Self {
        Self {
            tracked: Mutex::new(ids.into_iter().cloned().collect()),
        }
    }

    pub fn subscribe(&self, id: &EntityId) {
        self.tracked.lock().unwrap().insert(id.clone());
    }

    pub fn unsubscribe(&self, id: &EntityId) {
        self.tracked.lock().unwrap().remove(id);
    }
}

#[async_trait]
impl Membership for StaticMembership {
    async fn is_tracked(&self, id: &EntityId) -> Result<bool> {
        Ok(self.tracked.lock().unwrap().contains(id))
    }
}
