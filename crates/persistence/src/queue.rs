use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use outreach_core::domain::{Campaign, QueueStatus, SendQueueEntry};
use sqlx::types::Json;
use tracing::instrument;
use uuid::Uuid;

use crate::rows::SendQueueRow;
use crate::PgStore;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TemplateQueueCounts {
    pub template_name: String,
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
}

impl PgStore {
    #[instrument(skip(self, entries))]
    pub async fn insert_queue_entries(&self, entries: &[SendQueueEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("beginning queue insert tx")?;
        for e in entries {
            sqlx::query(
                "INSERT INTO send_queue
                    (id, campaign_id, sender_id, template_name, template_order, phone, payload,
                     status, retry_count, next_retry_at, whatsapp_message_id, actual_sent_at,
                     sent_at, updated_at, spam_error_detected)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)",
            )
            .bind(e.id)
            .bind(e.campaign_id)
            .bind(e.sender_id)
            .bind(&e.template_name)
            .bind(e.template_order)
            .bind(&e.phone)
            .bind(Json(&e.payload))
            .bind(e.status)
            .bind(e.retry_count)
            .bind(e.next_retry_at)
            .bind(&e.whatsapp_message_id)
            .bind(e.actual_sent_at)
            .bind(e.sent_at)
            .bind(e.updated_at)
            .bind(e.spam_error_detected)
            .execute(&mut *tx)
            .await
            .context("inserting send_queue entry")?;
        }
        tx.commit().await.context("committing queue insert tx")?;
        Ok(())
    }

    /// The claim step (§4.2 step 1-2): atomically flips matching rows from
    /// `ready` to `processing` and returns them. Uses `FOR UPDATE SKIP
    /// LOCKED` inside a transaction so two concurrent workers never claim
    /// the same row (§5 — no process-wide locks, the database is the sole
    /// mutual-exclusion mechanism).
    #[instrument(skip(self))]
    pub async fn claim_batch(
        &self,
        campaign_id: Uuid,
        current_template_index: i32,
        batch_size: i64,
    ) -> Result<Vec<SendQueueEntry>> {
        let mut tx = self.pool.begin().await.context("beginning claim tx")?;

        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM send_queue
             WHERE campaign_id = $1
               AND status = 'ready'
               AND (next_retry_at IS NULL OR next_retry_at <= now())
               AND (retry_count > 0 OR template_order = $2)
             ORDER BY template_order ASC, created_at ASC
             LIMIT $3
             FOR UPDATE SKIP LOCKED",
        )
        .bind(campaign_id)
        .bind(current_template_index)
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await
        .context("selecting claimable rows")?;

        if ids.is_empty() {
            tx.commit().await.ok();
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SendQueueRow>(
            "UPDATE send_queue SET status = 'processing', updated_at = now()
             WHERE id = ANY($1)
             RETURNING *",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await
        .context("claiming rows")?;

        tx.commit().await.context("committing claim tx")?;
        Ok(rows.into_iter().map(SendQueueEntry::from).collect())
    }

    /// Marks a row sent. If `whatsapp_message_id` collides with another row
    /// (the unique-violation backstop described in §4.2 "Idempotency" — a
    /// crash between provider-accept and persist caused a second dispatch
    /// that produced the same WAMID some other row already recorded), the
    /// row is still marked `sent` without storing the colliding WAMID,
    /// rather than erroring the whole tick.
    #[instrument(skip(self))]
    pub async fn mark_sent(&self, id: Uuid, wamid: &str, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE send_queue
             SET status = 'sent', whatsapp_message_id = $2, actual_sent_at = $3, sent_at = $3,
                 updated_at = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(wamid)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                sqlx::query(
                    "UPDATE send_queue SET status = 'sent', actual_sent_at = $2, sent_at = $2, updated_at = $2
                     WHERE id = $1",
                )
                .bind(id)
                .bind(now)
                .execute(&self.pool)
                .await
                .context("marking queue row sent after wamid conflict")?;
                Ok(())
            }
            Err(e) => Err(e).context("marking queue row sent"),
        }
    }

    /// Whether a row already exists for this WAMID — the idempotency
    /// backstop (§4.2 "Idempotency"): if the provider call returns a WAMID
    /// that already exists, treat the row as sent without a second dispatch.
    #[instrument(skip(self))]
    pub async fn queue_row_with_wamid(&self, wamid: &str) -> Result<Option<Uuid>> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM send_queue WHERE whatsapp_message_id = $1")
                .bind(wamid)
                .fetch_optional(&self.pool)
                .await
                .context("checking wamid idempotency")?;
        Ok(id)
    }

    /// Full row lookup by WAMID, used by webhook ingestion to recover which
    /// campaign a delivery-status update belongs to (§4.4).
    #[instrument(skip(self))]
    pub async fn find_queue_entry_by_wamid(&self, wamid: &str) -> Result<Option<SendQueueEntry>> {
        let row = sqlx::query_as::<_, SendQueueRow>(
            "SELECT * FROM send_queue WHERE whatsapp_message_id = $1",
        )
        .bind(wamid)
        .fetch_optional(&self.pool)
        .await
        .context("finding queue entry by wamid")?;
        Ok(row.map(SendQueueEntry::from))
    }

    #[instrument(skip(self))]
    pub async fn mark_retry(
        &self,
        id: Uuid,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        spam_error_detected: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE send_queue
             SET status = 'ready', retry_count = $2, next_retry_at = $3,
                 spam_error_detected = spam_error_detected OR $4, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(spam_error_detected)
        .execute(&self.pool)
        .await
        .context("marking queue row for retry")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn mark_permanent_fail(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE send_queue SET status = 'failed', updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("marking queue row permanently failed")?;
        Ok(())
    }

    /// True if any row with `template_order == index` still has a
    /// first-attempt (`retry_count = 0`) in `ready` — i.e. advancement is
    /// blocked for that index. Retry rows of the current index never block
    /// advancement (§9 Open Question resolution).
    #[instrument(skip(self))]
    pub async fn has_blocking_first_attempts(&self, campaign_id: Uuid, index: i32) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM send_queue
             WHERE campaign_id = $1 AND template_order = $2 AND retry_count = 0 AND status = 'ready'",
        )
        .bind(campaign_id)
        .bind(index)
        .fetch_one(&self.pool)
        .await
        .context("counting blocking first attempts")?;
        Ok(count > 0)
    }

    /// Rows still open (not yet terminal) for a campaign — used by the
    /// completion check (§4.2 step 5).
    #[instrument(skip(self))]
    pub async fn count_open_rows(&self, campaign_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM send_queue
             WHERE campaign_id = $1 AND status IN ('ready', 'processing')",
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
        .context("counting open rows")?;
        Ok(count)
    }

    /// Rows flagged `spam_error_detected` within the trailing window, for
    /// the spam auto-pause check (§4.2.a).
    #[instrument(skip(self))]
    pub async fn count_recent_spam_detections(
        &self,
        campaign_id: Uuid,
        window_minutes: i64,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM send_queue
             WHERE campaign_id = $1 AND spam_error_detected = TRUE
               AND updated_at >= now() - ($2 || ' minutes')::interval",
        )
        .bind(campaign_id)
        .bind(window_minutes.to_string())
        .fetch_one(&self.pool)
        .await
        .context("counting recent spam detections")?;
        Ok(count)
    }

    /// Clears `spam_error_detected` on all of a campaign's rows, restarting
    /// the window from zero on auto-resume (§9 Open Question resolution).
    #[instrument(skip(self))]
    pub async fn clear_spam_flags(&self, campaign_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE send_queue SET spam_error_detected = FALSE WHERE campaign_id = $1")
            .bind(campaign_id)
            .execute(&self.pool)
            .await
            .context("clearing spam flags")?;
        Ok(())
    }

    /// Reclaim `processing` rows stuck longer than `grace_minutes` back to
    /// `ready` (§7 "Internal" taxonomy entry — the stuck-row reaper).
    #[instrument(skip(self))]
    pub async fn reap_stuck_processing(&self, grace_minutes: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE send_queue SET status = 'ready', updated_at = now()
             WHERE status = 'processing'
               AND updated_at < now() - ($1 || ' minutes')::interval",
        )
        .bind(grace_minutes.to_string())
        .execute(&self.pool)
        .await
        .context("reaping stuck processing rows")?;
        Ok(result.rows_affected())
    }

    /// Builds one `send_queue` row per valid contact from the template
    /// round-robin assigned at campaign-create time, looked up against the
    /// campaign's `template_names` for ordering. Shared by the
    /// immediate-start path (orchestration) and the scheduled-start path
    /// (scheduler tick) so both materialize rows identically.
    #[instrument(skip(self, campaign))]
    pub async fn materialize_queue_from_contacts(&self, campaign: &Campaign) -> Result<usize> {
        let contacts = self.list_valid_contacts(campaign.id).await?;
        let template_order: HashMap<&str, i32> = campaign
            .template_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i as i32))
            .collect();

        let now = Utc::now();
        let entries: Vec<SendQueueEntry> = contacts
            .iter()
            .filter_map(|c| {
                let template_name = c.template_name.clone()?;
                let order = *template_order.get(template_name.as_str())?;
                Some(SendQueueEntry {
                    id: Uuid::new_v4(),
                    campaign_id: campaign.id,
                    sender_id: campaign.sender_id,
                    template_name,
                    template_order: order,
                    phone: c.phone.clone(),
                    payload: c.variables.clone(),
                    status: QueueStatus::Ready,
                    retry_count: 0,
                    next_retry_at: None,
                    whatsapp_message_id: None,
                    actual_sent_at: None,
                    sent_at: None,
                    updated_at: now,
                    spam_error_detected: false,
                })
            })
            .collect();

        let count = entries.len();
        self.insert_queue_entries(&entries).await?;
        Ok(count)
    }

    /// Per-template queue counters feeding the per-template stats
    /// breakdown: total rows, rows dispatched (`sent`), and rows that
    /// exhausted retries (`failed`) in the queue itself — as distinct from
    /// the webhook-observed `failed` status in `message_status_logs`.
    #[instrument(skip(self))]
    pub async fn template_queue_counts(&self, campaign_id: Uuid) -> Result<Vec<TemplateQueueCounts>> {
        let rows = sqlx::query_as::<_, TemplateQueueCounts>(
            "SELECT template_name,
                    count(*) AS total,
                    count(*) FILTER (WHERE status = 'sent') AS sent,
                    count(*) FILTER (WHERE status = 'failed') AS failed
             FROM send_queue
             WHERE campaign_id = $1
             GROUP BY template_name",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .context("loading per-template queue counts")?;
        Ok(rows)
    }

    /// Operator retry-failed action (§4.3): flips `failed` rows back to
    /// `ready` and resets their retry state.
    #[instrument(skip(self))]
    pub async fn retry_failed_rows(&self, campaign_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE send_queue
             SET status = 'ready', retry_count = 0, next_retry_at = NULL,
                 spam_error_detected = FALSE, updated_at = now()
             WHERE campaign_id = $1 AND status = 'failed'",
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await
        .context("retrying failed rows")?;
        Ok(result.rows_affected())
    }
}
