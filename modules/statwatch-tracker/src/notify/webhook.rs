use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::backend::NotifyBackend;
use crate::types::{DeltaNotice, RollbackNotice};

/// JSON webhook backend. Posts `{"text": ..., "event": ...}` payloads.
pub struct WebhookBackend {
    webhook_url: String,
    http: reqwest::Client,
}

impl WebhookBackend {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Webhook returned non-success");
            anyhow::bail!("Webhook returned {status}");
        }

        Ok(())
    }
}

fn delta_text(notice: &DeltaNotice) -> String {
    let changes: Vec<String> = notice
        .deltas
        .iter()
        .map(|(category, delta)| {
            let value = notice.values.get(category).copied().unwrap_or_default();
            format!("{category} +{delta} ({value})")
        })
        .collect();
    format!("{} [{}]: {}", notice.entity, notice.group, changes.join(", "))
}

fn rollback_text(notice: &RollbackNotice) -> String {
    let lines: Vec<String> = notice
        .corrections
        .iter()
        .map(|c| format!("{} {}: {} -> {}", c.entity, c.category, c.known, c.value))
        .collect();
    format!("Rollback committed:\n{}", lines.join("\n"))
}

#[async_trait]
impl NotifyBackend for WebhookBackend {
    async fn send_delta(&self, notice: &DeltaNotice) -> anyhow::Result<()> {
        self.post(json!({
            "text": delta_text(notice),
            "event": "delta",
            "payload": notice,
        }))
        .await
    }

    async fn send_rollback_notice(&self, notice: &RollbackNotice) -> anyhow::Result<()> {
        if notice.corrections.is_empty() {
            return Ok(());
        }
        self.post(json!({
            "text": rollback_text(notice),
            "event": "rollback",
            "payload": notice,
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use statwatch_common::{Category, CategoryGroup, EntityId, Skill};

    use crate::rollback::StagedCorrection;

    #[test]
    fn delta_text_lists_change_and_new_value() {
        let fishing = Category::Skill(Skill::Fishing);
        let notice = DeltaNotice {
            entity: EntityId::new("Zezima").unwrap(),
            group: CategoryGroup::Skill,
            deltas: BTreeMap::from([(fishing, 2)]),
            values: BTreeMap::from([(fishing, 12)]),
        };
        assert_eq!(delta_text(&notice), "zezima [skill]: fishing +2 (12)");
    }

    #[test]
    fn rollback_text_lists_corrections() {
        let notice = RollbackNotice {
            corrections: vec![StagedCorrection {
                entity: EntityId::new("x").unwrap(),
                category: Category::Skill(Skill::Fishing),
                known: 50,
                value: 40,
            }],
        };
        assert_eq!(rollback_text(&notice), "Rollback committed:\nx fishing: 50 -> 40");
    }
}
