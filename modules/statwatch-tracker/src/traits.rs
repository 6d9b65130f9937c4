// Collaborator boundaries for the tracker.
//
// StatsSource  - fetch a fresh snapshot from upstream (typed errors).
// StatsPersistence - durable Known State writes plus start-up hydration.
// Membership   - whether anyone still tracks an entity.
//
// Production impls wrap HiscoresClient and PgStatsStore; in-memory mocks
// live in `testing`.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use hiscores_client::{HiscoresClient, HiscoresError, PlayerListing};
use statwatch_common::{Category, CategoryGroup, EntityId, KnownState, Snapshot};
use statwatch_store::PgStatsStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The entity is not on the upstream listing.
    #[error("entity not found upstream")]
    NotFound,

    /// The upstream contract broke; nothing derived from it can be trusted.
    #[error("upstream format changed: {0}")]
    FormatChanged(String),

    #[error("transient upstream failure: {0}")]
    Transient(String),
}

// ---------------------------------------------------------------------------
// StatsSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_snapshot(&self, id: &EntityId) -> std::result::Result<Snapshot, FetchError>;
}

#[async_trait]
impl StatsSource for HiscoresClient {
    async fn fetch_snapshot(&self, id: &EntityId) -> std::result::Result<Snapshot, FetchError> {
        let listing = self.player(id.as_str()).await.map_err(|e| match e {
            HiscoresError::NotFound(_) => FetchError::NotFound,
            HiscoresError::Parse(msg) => FetchError::FormatChanged(msg),
            other => FetchError::Transient(other.to_string()),
        })?;
        snapshot_from_listing(&listing, Utc::now())
    }
}

/// Convert a hiscores listing into a snapshot.
///
/// Every skill must be present in the payload; a missing skill means the
/// listing layout changed. Activities may be absent (new bosses appear over
/// time) and unranked activities report a negative score; both are missing.
pub fn snapshot_from_listing(
    listing: &PlayerListing,
    fetched_at: DateTime<Utc>,
) -> std::result::Result<Snapshot, FetchError> {
    let mut values = BTreeMap::new();

    for category in Category::all() {
        let name = category.upstream_name();
        let reported = match category.group() {
            CategoryGroup::Skill => {
                let entry = listing.skill(name).ok_or_else(|| {
                    FetchError::FormatChanged(format!("skill {name} missing from listing"))
                })?;
                entry.level
            }
            CategoryGroup::Boss | CategoryGroup::Clue => match listing.activity(name) {
                Some(entry) => entry.score,
                None => continue,
            },
        };

        let floor = i64::try_from(category.baseline()).unwrap_or(0);
        if reported >= floor {
            if let Ok(value) = u64::try_from(reported) {
                values.insert(category, value);
            }
        }
    }

    Ok(Snapshot::new(values, fetched_at))
}

// ---------------------------------------------------------------------------
// StatsPersistence
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StatsPersistence: Send + Sync {
    /// Upsert values for one group. Idempotent per (entity, category).
    async fn persist_category_values(
        &self,
        id: &EntityId,
        group: CategoryGroup,
        values: &BTreeMap<Category, u64>,
    ) -> Result<()>;

    async fn persist_activity_timestamp(&self, id: &EntityId, at: DateTime<Utc>) -> Result<()>;

    async fn persist_listing_status(&self, id: &EntityId, on_listing: bool) -> Result<()>;

    /// Every persisted entity, used to rebuild state at start-up.
    async fn load_known_states(&self) -> Result<Vec<(EntityId, KnownState)>>;

    async fn delete_entity(&self, id: &EntityId) -> Result<()>;
}

#[async_trait]
impl StatsPersistence for PgStatsStore {
    async fn persist_category_values(
        &self,
        id: &EntityId,
        group: CategoryGroup,
        values: &BTreeMap<Category, u64>,
    ) -> Result<()> {
        self.upsert_category_values(id, group, values).await
    }

    async fn persist_activity_timestamp(&self, id: &EntityId, at: DateTime<Utc>) -> Result<()> {
        self.set_last_active(id, at).await
    }

    async fn persist_listing_status(&self, id: &EntityId, on_listing: bool) -> Result<()> {
        self.set_on_listing(id, on_listing).await
    }

    async fn load_known_states(&self) -> Result<Vec<(EntityId, KnownState)>> {
        PgStatsStore::load_known_states(self).await
    }

    async fn delete_entity(&self, id: &EntityId) -> Result<()> {
        PgStatsStore::delete_entity(self, id).await
    }
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Membership: Send + Sync {
    async fn is_tracked(&self, id: &EntityId) -> Result<bool>;
}

#[async_trait]
impl Membership for PgStatsStore {
    async fn is_tracked(&self, id: &EntityId) -> Result<bool> {
        self.is_subscribed(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiscores_client::parse_listing;
    use statwatch_common::{Boss, ClueTier, Skill};

    fn listing_json(skills: &[(&str, i64)], activities: &[(&str, i64)]) -> String {
        let skills: Vec<String> = skills
            .iter()
            .enumerate()
            .map(|(i, (name, level))| {
                format!(r#"{{"id":{i},"name":"{name}","rank":100,"level":{level},"xp":1000}}"#)
            })
            .collect();
        let activities: Vec<String> = activities
            .iter()
            .enumerate()
            .map(|(i, (name, score))| {
                let rank = if *score < 0 { -1 } else { 100 };
                format!(r#"{{"id":{i},"name":"{name}","rank":{rank},"score":{score}}}"#)
            })
            .collect();
        format!(
            r#"{{"skills":[{}],"activities":[{}]}}"#,
            skills.join(","),
            activities.join(",")
        )
    }

    fn all_skills_at(level: i64) -> Vec<(&'static str, i64)> {
        Skill::ALL.iter().map(|s| (s.upstream_name(), level)).collect()
    }

    #[test]
    fn listing_converts_to_snapshot() {
        let mut skills = all_skills_at(10);
        skills.push(("Overall", 230));
        let body = listing_json(
            &skills,
            &[("Zulrah", 12), ("Clue Scrolls (easy)", 3), ("Vorkath", -1)],
        );
        let listing = parse_listing(&body).unwrap();

        let snapshot = snapshot_from_listing(&listing, Utc::now()).unwrap();
        assert_eq!(snapshot.get(Category::Skill(Skill::Fishing)), Some(10));
        assert_eq!(snapshot.get(Category::Boss(Boss::Zulrah)), Some(12));
        assert_eq!(snapshot.get(Category::Clue(ClueTier::Easy)), Some(3));
        assert!(snapshot.is_missing(Category::Boss(Boss::Vorkath)));
        assert!(snapshot.is_missing(Category::Boss(Boss::Nex)));
    }

    #[test]
    fn floor_level_skill_is_present() {
        let listing = parse_listing(&listing_json(&all_skills_at(1), &[])).unwrap();
        let snapshot = snapshot_from_listing(&listing, Utc::now()).unwrap();
        assert_eq!(snapshot.get(Category::Skill(Skill::Hunter)), Some(1));
    }

    #[test]
    fn missing_skill_means_format_changed() {
        let skills: Vec<(&str, i64)> = all_skills_at(5)
            .into_iter()
            .filter(|(name, _)| *name != "Construction")
            .collect();
        let listing = parse_listing(&listing_json(&skills, &[])).unwrap();

        let err = snapshot_from_listing(&listing, Utc::now()).unwrap_err();
        assert!(matches!(err, FetchError::FormatChanged(_)));
    }
}
