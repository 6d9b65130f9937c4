use async_trait::async_trait;
use tracing::warn;

use statwatch_common::AppConfig;

use super::backend::NotifyBackend;
use super::webhook::WebhookBackend;
use crate::types::{DeltaNotice, RollbackNotice};

/// Routes deltas and rollback notices to separate backends.
/// Send failures are logged and swallowed; notification never affects state.
pub struct NotifyRouter {
    delta_backend: Box<dyn NotifyBackend>,
    rollback_backend: Box<dyn NotifyBackend>,
}

impl NotifyRouter {
    pub fn new(
        delta_backend: Box<dyn NotifyBackend>,
        rollback_backend: Box<dyn NotifyBackend>,
    ) -> Self {
        Self {
            delta_backend,
            rollback_backend,
        }
    }

    /// Build from `NOTIFY_WEBHOOK_URL` and the optional
    /// `NOTIFY_WEBHOOK_URL_ROLLBACK` override. `None` when no webhook is set.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let default_url = config.notify_webhook_url.clone()?;
        let rollback_url = config
            .notify_webhook_url_rollback
            .clone()
            .unwrap_or_else(|| default_url.clone());

        Some(Self::new(
            Box::new(WebhookBackend::new(default_url)),
            Box::new(WebhookBackend::new(rollback_url)),
        ))
    }
}

#[async_trait]
impl NotifyBackend for NotifyRouter {
    async fn send_delta(&self, notice: &DeltaNotice) -> anyhow::Result<()> {
        if let Err(e) = self.delta_backend.send_delta(notice).await {
            warn!(error = %e, entity = %notice.entity, group = %notice.group, "Failed to send delta notification");
        }
        Ok(())
    }

    async fn send_rollback_notice(&self, notice: &RollbackNotice) -> anyhow::Result<()> {
        if let Err(e) = self.rollback_backend.send_rollback_notice(notice).await {
            warn!(error = %e, corrections = notice.corrections.len(), "Failed to send rollback notice");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use statwatch_common::{CategoryGroup, EntityId};

    use crate::testing::RecordingNotifier;

    struct Shared(Arc<RecordingNotifier>);

    #[async_trait]
    impl NotifyBackend for Shared {
        async fn send_delta(&self, notice: &DeltaNotice) -> anyhow::Result<()> {
            self.0.send_delta(notice).await
        }

        async fn send_rollback_notice(&self, notice: &RollbackNotice) -> anyhow::Result<()> {
            self.0.send_rollback_notice(notice).await
        }
    }

    fn notice() -> DeltaNotice {
        DeltaNotice {
            entity: EntityId::new("x").unwrap(),
            group: CategoryGroup::Skill,
            deltas: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn routes_by_notice_kind() {
        let deltas = Arc::new(RecordingNotifier::new());
        let rollbacks = Arc::new(RecordingNotifier::new());
        let router = NotifyRouter::new(
            Box::new(Shared(deltas.clone())),
            Box::new(Shared(rollbacks.clone())),
        );

        router.send_delta(&notice()).await.unwrap();
        router
            .send_rollback_notice(&RollbackNotice {
                corrections: vec![],
            })
            .await
            .unwrap();

        assert_eq!(deltas.deltas().len(), 1);
        assert!(deltas.rollbacks().is_empty());
        assert_eq!(rollbacks.rollbacks().len(), 1);
        assert!(rollbacks.deltas().is_empty());
    }

    #[tokio::test]
    async fn backend_failures_are_swallowed() {
        let failing = Arc::new(RecordingNotifier::failing());
        let router = NotifyRouter::new(
            Box::new(Shared(failing.clone())),
            Box::new(Shared(failing)),
        );

        assert!(router.send_delta(&notice()).await.is_ok());
    }

    #[test]
    fn no_webhook_means_no_router() {
        let config = AppConfig {
            database_url: "postgres://localhost/statwatch".into(),
            notify_webhook_url: None,
            notify_webhook_url_rollback: None,
        };
        assert!(NotifyRouter::from_config(&config).is_none());
    }
}
