//! Postgres persistence for tracked entities.
//!
//! Stores the last-committed value of every (entity, category) pair, the
//! per-entity listing flag and activity timestamp, and the subscriptions that
//! decide whether an entity is tracked at all. Writes are upserts keyed by
//! (entity, category), so replaying a write is harmless.

pub mod store;

pub use store::PgStatsStore;
