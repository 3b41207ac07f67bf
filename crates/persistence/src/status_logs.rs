use std::collections::HashMap;

use anyhow::{Context, Result};
use outreach_core::domain::{DeliveryStatus, MessageStatusLog};
use tracing::instrument;
use uuid::Uuid;

use crate::PgStore;

impl PgStore {
    /// Append-only: the webhook handler only ever inserts here, never
    /// updates campaign counters directly (§4.4, §9 "append-only log +
    /// pull-based derivation"). Duplicate (wamid, status) pairs are
    /// tolerated — idempotent replay is a property of the aggregator, not
    /// of this insert.
    #[instrument(skip(self, log))]
    pub async fn append_status_log(&self, log: &MessageStatusLog) -> Result<()> {
        sqlx::query(
            "INSERT INTO message_status_logs (id, whatsapp_message_id, campaign_id, sender_id, status, created_at)
             VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(log.id)
        .bind(&log.whatsapp_message_id)
        .bind(log.campaign_id)
        .bind(log.sender_id)
        .bind(log.status)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .context("appending status log")?;
        Ok(())
    }

    /// Per-WAMID derived status under the monotone hierarchy
    /// `sent < delivered < read`, with `failed` ignored once a message has
    /// reached `delivered` or `read` (the multi-device contradiction rule,
    /// §4.4 "Status reconciliation").
    #[instrument(skip(self))]
    pub async fn derived_status(&self, wamid: &str) -> Result<Option<DeliveryStatus>> {
        let statuses: Vec<DeliveryStatus> = sqlx::query_scalar(
            "SELECT status FROM message_status_logs WHERE whatsapp_message_id = $1",
        )
        .bind(wamid)
        .fetch_all(&self.pool)
        .await
        .context("loading status history for wamid")?;

        Ok(reduce_statuses(&statuses))
    }

    /// Single-pass per-campaign aggregation feeding the stats aggregator
    /// (§4.6) and the orchestration contract's delivered/read/failed
    /// counters. Returns (delivered, read, failed_terminal) counts applying
    /// the same multi-device rule as `derived_status`, but computed with
    /// one grouped query instead of one query per message (§4.6 "no N+1").
    #[instrument(skip(self))]
    pub async fn campaign_delivery_counts(&self, campaign_id: Uuid) -> Result<DeliveryCounts> {
        let rows: Vec<(String, DeliveryStatus)> = sqlx::query_as(
            "SELECT whatsapp_message_id, status FROM message_status_logs WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .context("loading campaign status logs")?;

        let mut by_wamid: std::collections::HashMap<String, Vec<DeliveryStatus>> =
            std::collections::HashMap::new();
        for (wamid, status) in rows {
            by_wamid.entry(wamid).or_default().push(status);
        }

        let mut counts = DeliveryCounts::default();
        for statuses in by_wamid.values() {
            match reduce_statuses(statuses) {
                Some(DeliveryStatus::Read) => counts.read += 1,
                Some(DeliveryStatus::Delivered) => counts.delivered += 1,
                Some(DeliveryStatus::Failed) => counts.failed += 1,
                Some(DeliveryStatus::Sent) | None => {}
            }
        }
        Ok(counts)
    }

    /// Same multi-device reduction as `campaign_delivery_counts`, grouped by
    /// the originating `send_queue` row's template_name instead of collapsed
    /// campaign-wide — feeds the per-template stats breakdown.
    #[instrument(skip(self))]
    pub async fn template_delivery_counts(
        &self,
        campaign_id: Uuid,
    ) -> Result<HashMap<String, DeliveryCounts>> {
        let rows: Vec<(String, String, DeliveryStatus)> = sqlx::query_as(
            "SELECT sq.template_name, msl.whatsapp_message_id, msl.status
             FROM message_status_logs msl
             JOIN send_queue sq ON sq.whatsapp_message_id = msl.whatsapp_message_id
             WHERE msl.campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .context("loading per-template status logs")?;

        let mut by_template: HashMap<String, HashMap<String, Vec<DeliveryStatus>>> = HashMap::new();
        for (template_name, wamid, status) in rows {
            by_template
                .entry(template_name)
                .or_default()
                .entry(wamid)
                .or_default()
                .push(status);
        }

        let mut out = HashMap::new();
        for (template_name, by_wamid) in by_template {
            let mut counts = DeliveryCounts::default();
            for statuses in by_wamid.values() {
                match reduce_statuses(statuses) {
                    Some(DeliveryStatus::Read) => counts.read += 1,
                    Some(DeliveryStatus::Delivered) => counts.delivered += 1,
                    Some(DeliveryStatus::Failed) => counts.failed += 1,
                    Some(DeliveryStatus::Sent) | None => {}
                }
            }
            out.insert(template_name, counts);
        }
        Ok(out)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryCounts {
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
}

/// Fold a WAMID's full status history into its derived status: the highest
/// reached among {sent, delivered, read}, with `failed` only counting if
/// neither `delivered` nor `read` was ever observed.
fn reduce_statuses(statuses: &[DeliveryStatus]) -> Option<DeliveryStatus> {
    if statuses.is_empty() {
        return None;
    }
    let reached_delivered_or_read = statuses
        .iter()
        .any(|s| matches!(s, DeliveryStatus::Delivered | DeliveryStatus::Read));

    statuses
        .iter()
        .copied()
        .filter(|s| !(matches!(s, DeliveryStatus::Failed) && reached_delivered_or_read))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_multi_device_resolves_to_read() {
        // literal scenario 5: delivered, read, sent (out of order), failed
        let history = vec![
            DeliveryStatus::Delivered,
            DeliveryStatus::Read,
            DeliveryStatus::Sent,
            DeliveryStatus::Failed,
        ];
        assert_eq!(reduce_statuses(&history), Some(DeliveryStatus::Read));
    }

    #[test]
    fn plain_failure_with_no_delivery_stays_failed() {
        let history = vec![DeliveryStatus::Sent, DeliveryStatus::Failed];
        assert_eq!(reduce_statuses(&history), Some(DeliveryStatus::Failed));
    }

    #[test]
    fn idempotent_replay_is_stable() {
        let once = vec![DeliveryStatus::Sent, DeliveryStatus::Delivered];
        let replayed = vec![
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Delivered,
            DeliveryStatus::Sent,
        ];
        assert_eq!(reduce_statuses(&once), reduce_statuses(&replayed));
    }
}
