use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{Category, CategoryGroup};
use crate::error::StatwatchError;

/// Longest identifier accepted after normalization.
const MAX_ENTITY_ID_LEN: usize = 64;

// =============================================================================
// EntityId
// =============================================================================

/// Case-normalized identifier of a tracked entity (a player name).
///
/// Upstream treats spaces, underscores and hyphens in names as equivalent and
/// ignores case, so runs of all three collapse to a single space and the id is
/// lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: &str) -> Result<Self, StatwatchError> {
        let mapped = raw
            .chars()
            .map(|c| match c {
                '_' | '-' => ' ',
                other => other.to_ascii_lowercase(),
            })
            .collect::<String>();
        let normalized = mapped.split_whitespace().collect::<Vec<_>>().join(" ");

        if normalized.is_empty() || normalized.len() > MAX_ENTITY_ID_LEN {
            return Err(StatwatchError::InvalidEntityId(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntityId {
    type Err = StatwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = StatwatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// One fetch's category values for a single entity.
///
/// Only categories the upstream reported are present; an absent category is
/// "missing", which is distinct from a reported zero. Snapshots are never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    values: BTreeMap<Category, u64>,
    fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(values: BTreeMap<Category, u64>, fetched_at: DateTime<Utc>) -> Self {
        Self { values, fetched_at }
    }

    /// Build a snapshot stamped with the current time.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Category, u64)>) -> Self {
        Self::new(pairs.into_iter().collect(), Utc::now())
    }

    pub fn get(&self, category: Category) -> Option<u64> {
        self.values.get(&category).copied()
    }

    pub fn is_missing(&self, category: Category) -> bool {
        !self.values.contains_key(&category)
    }

    /// Reported values restricted to one group.
    pub fn group_values(&self, group: CategoryGroup) -> BTreeMap<Category, u64> {
        self.values
            .iter()
            .filter(|(c, _)| c.group() == group)
            .map(|(c, v)| (*c, *v))
            .collect()
    }

    pub fn values(&self) -> &BTreeMap<Category, u64> {
        &self.values
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// KnownState
// =============================================================================

/// Last-committed ground truth for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownState {
    pub values: BTreeMap<Category, u64>,
    pub last_updated: DateTime<Utc>,
    /// Last time any category showed a confirmed positive change.
    pub last_active: Option<DateTime<Utc>>,
    /// Whether the entity appeared on the upstream listing at the last fetch.
    pub on_listing: bool,
}

impl KnownState {
    /// State created from an entity's first successful fetch.
    pub fn primed(snapshot: &Snapshot) -> Self {
        Self {
            values: snapshot.values().clone(),
            last_updated: snapshot.fetched_at(),
            last_active: None,
            on_listing: true,
        }
    }

    pub fn get(&self, category: Category) -> Option<u64> {
        self.values.get(&category).copied()
    }

    pub fn set(&mut self, category: Category, value: u64) {
        self.values.insert(category, value);
    }

    pub fn group_values(&self, group: CategoryGroup) -> BTreeMap<Category, u64> {
        self.values
            .iter()
            .filter(|(c, _)| c.group() == group)
            .map(|(c, v)| (*c, *v))
            .collect()
    }
}
