use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use statwatch_common::{Category, CategoryGroup, EntityId, KnownState};

/// Durable store for Known State, backed by Postgres.
#[derive(Clone)]
pub struct PgStatsStore {
    pool: PgPool,
}

impl PgStatsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Upsert values for one category group. Creates the entity row if needed.
    pub async fn upsert_category_values(
        &self,
        id: &EntityId,
        group: CategoryGroup,
        values: &BTreeMap<Category, u64>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO tracked_entities (entity_id, last_updated)
             VALUES ($1, now())
             ON CONFLICT (entity_id) DO UPDATE SET last_updated = now()",
        )
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        for (category, value) in values {
            if category.group() != group {
                warn!(
                    entity = %id,
                    category = %category,
                    group = %group,
                    "Skipping category persisted under the wrong group"
                );
                continue;
            }
            let value = i64::try_from(*value)
                .with_context(|| format!("value {value} for {category} exceeds BIGINT"))?;

            sqlx::query(
                "INSERT INTO category_values (entity_id, category_group, category, value, updated_at)
                 VALUES ($1, $2, $3, $4, now())
                 ON CONFLICT (entity_id, category)
                 DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
            )
            .bind(id.as_str())
            .bind(group.as_str())
            .bind(category.key())
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_last_active(&self, id: &EntityId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO tracked_entities (entity_id, last_active)
             VALUES ($1, $2)
             ON CONFLICT (entity_id) DO UPDATE SET last_active = EXCLUDED.last_active",
        )
        .bind(id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_on_listing(&self, id: &EntityId, on_listing: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO tracked_entities (entity_id, on_listing)
             VALUES ($1, $2)
             ON CONFLICT (entity_id) DO UPDATE SET on_listing = EXCLUDED.on_listing",
        )
        .bind(id.as_str())
        .bind(on_listing)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load every persisted entity with its category values.
    /// Rows with unknown categories or invalid ids are skipped with a warning.
    pub async fn load_known_states(&self) -> Result<Vec<(EntityId, KnownState)>> {
        let entities = sqlx::query_as::<_, (String, bool, DateTime<Utc>, Option<DateTime<Utc>>)>(
            "SELECT entity_id, on_listing, last_updated, last_active FROM tracked_entities",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut states: HashMap<String, KnownState> = entities
            .into_iter()
            .map(|(entity_id, on_listing, last_updated, last_active)| {
                (
                    entity_id,
                    KnownState {
                        values: BTreeMap::new(),
                        last_updated,
                        last_active,
                        on_listing,
                    },
                )
            })
            .collect();

        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT entity_id, category, value FROM category_values",
        )
        .fetch_all(&self.pool)
        .await?;

        for (entity_id, key, value) in rows {
            let Some(state) = states.get_mut(&entity_id) else {
                continue;
            };
            let Some(category) = Category::from_key(&key) else {
                warn!(entity = %entity_id, category = %key, "Skipping unknown persisted category");
                continue;
            };
            match u64::try_from(value) {
                Ok(v) => state.set(category, v),
                Err(_) => warn!(entity = %entity_id, category = %key, value, "Skipping negative persisted value"),
            }
        }

        let mut loaded = Vec::with_capacity(states.len());
        for (raw, state) in states {
            match EntityId::new(&raw) {
                Ok(id) => loaded.push((id, state)),
                Err(e) => warn!(entity = %raw, error = %e, "Skipping invalid persisted entity id"),
            }
        }
        loaded.sort_by(|a, b| a.0.cmp(&b.0));

        info!(entities = loaded.len(), "Loaded known states");
        Ok(loaded)
    }

    /// Remove an entity and (via cascade) its category values.
    pub async fn delete_entity(&self, id: &EntityId) -> Result<()> {
        sqlx::query("DELETE FROM tracked_entities WHERE entity_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// True when at least one subscriber still tracks the entity.
    pub async fn is_subscribed(&self, id: &EntityId) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM entity_subscriptions WHERE entity_id = $1)",
        )
        .bind(id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Record a subscription. Returns true if it was new.
    pub async fn subscribe(&self, id: &EntityId, subscriber_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO entity_subscriptions (entity_id, subscriber_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(id.as_str())
        .bind(subscriber_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop a subscription. Returns true if one existed.
    pub async fn unsubscribe(&self, id: &EntityId, subscriber_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM entity_subscriptions WHERE entity_id = $1 AND subscriber_id = $2",
        )
        .bind(id.as_str())
        .bind(subscriber_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
