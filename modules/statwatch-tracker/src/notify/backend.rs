use async_trait::async_trait;

use crate::types::{DeltaNotice, RollbackNotice};

/// Pluggable notification backend. Delivery is best-effort; callers log and
/// move on when a send fails.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Announce a confirmed positive change for one category group.
    async fn send_delta(&self, notice: &DeltaNotice) -> anyhow::Result<()>;

    /// Announce committed rollback corrections.
    async fn send_rollback_notice(&self, notice: &RollbackNotice) -> anyhow::Result<()>;
}
