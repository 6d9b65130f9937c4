use std::collections::HashMap;

use chrono::{DateTime, Utc};

use statwatch_common::{Category, EntityId, KnownState, Snapshot};

/// Owned Known State for every tracked entity. All mutation goes through here.
#[derive(Debug, Default)]
pub struct StateStore {
    entities: HashMap<EntityId, KnownState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&KnownState> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// First successful fetch for an entity.
    pub fn prime(&mut self, id: &EntityId, snapshot: &Snapshot) {
        self.entities
            .insert(id.clone(), KnownState::primed(snapshot));
    }

    /// Restore a previously persisted state.
    pub fn insert(&mut self, id: EntityId, state: KnownState) {
        self.entities.insert(id, state);
    }

    /// Overwrite one category. No-op for unknown entities.
    pub fn set_value(&mut self, id: &EntityId, category: Category, value: u64, at: DateTime<Utc>) {
        if let Some(state) = self.entities.get_mut(id) {
            state.set(category, value);
            state.last_updated = at;
        }
    }

    pub fn set_on_listing(&mut self, id: &EntityId, on_listing: bool) {
        if let Some(state) = self.entities.get_mut(id) {
            state.on_listing = on_listing;
        }
    }

    pub fn set_last_active(&mut self, id: &EntityId, at: DateTime<Utc>) {
        if let Some(state) = self.entities.get_mut(id) {
            state.last_active = Some(at);
        }
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<KnownState> {
        self.entities.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
