use async_trait::async_trait;

use super::backend::NotifyBackend;
use crate::types::{DeltaNotice, RollbackNotice};

/// Used when no webhook is configured.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn send_delta(&self, _notice: &DeltaNotice) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_rollback_notice(&self, _notice: &RollbackNotice) -> anyhow::Result<()> {
        Ok(())
    }
}
