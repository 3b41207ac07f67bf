use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use outreach_core::domain::{Campaign, CampaignStatus};
use tracing::instrument;
use uuid::Uuid;

use crate::rows::CampaignRow;
use crate::PgStore;

impl PgStore {
    #[instrument(skip(self, campaign))]
    pub async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        sqlx::query(
            "INSERT INTO campaigns (
                id, sender_id, name, template_names, total_contacts, invalid_contacts_count,
                total_sent, total_failed, total_delivered, total_read, total_replied,
                scheduled_start_time, start_time, end_time, status, current_template_index,
                spam_pause_count, spam_paused_until, pause_reason
             ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)",
        )
        .bind(campaign.id)
        .bind(campaign.sender_id)
        .bind(&campaign.name)
        .bind(&campaign.template_names)
        .bind(campaign.total_contacts)
        .bind(campaign.invalid_contacts_count)
        .bind(campaign.total_sent)
        .bind(campaign.total_failed)
        .bind(campaign.total_delivered)
        .bind(campaign.total_read)
        .bind(campaign.total_replied)
        .bind(campaign.scheduled_start_time)
        .bind(campaign.start_time)
        .bind(campaign.end_time)
        .bind(campaign.status)
        .bind(campaign.current_template_index)
        .bind(campaign.spam_pause_count)
        .bind(campaign.spam_paused_until)
        .bind(&campaign.pause_reason)
        .execute(&self.pool)
        .await
        .context("inserting campaign")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
        let row = sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching campaign")?;
        Ok(row.map(Campaign::from))
    }

    #[instrument(skip(self))]
    pub async fn list_running_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM campaigns WHERE status = 'running'
             AND (spam_paused_until IS NULL OR spam_paused_until <= now())",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing running campaigns")?;
        Ok(rows.into_iter().map(Campaign::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn list_due_scheduled_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM campaigns WHERE status = 'scheduled' AND scheduled_start_time <= now()",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing due scheduled campaigns")?;
        Ok(rows.into_iter().map(Campaign::from).collect())
    }

    /// First-offense spam pauses due for Scheduler Tick auto-resume (§4.5).
    #[instrument(skip(self))]
    pub async fn list_due_spam_resumes(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM campaigns
             WHERE status = 'paused' AND spam_pause_count = 1 AND spam_paused_until <= now()",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing due spam resumes")?;
        Ok(rows.into_iter().map(Campaign::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn set_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
        start_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns SET status = $2, start_time = COALESCE($3, start_time) WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(start_time)
        .execute(&self.pool)
        .await
        .context("updating campaign status")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn mark_campaign_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns SET status = 'completed', end_time = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("marking campaign completed")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn mark_campaign_fatal(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE campaigns SET status = 'failed', end_time = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("marking campaign fatal")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn pause_campaign_for_spam(
        &self,
        id: Uuid,
        spam_pause_count: i32,
        spam_paused_until: Option<DateTime<Utc>>,
        pause_reason: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns
             SET status = 'paused', spam_pause_count = $2, spam_paused_until = $3, pause_reason = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(spam_pause_count)
        .bind(spam_paused_until)
        .bind(pause_reason)
        .execute(&self.pool)
        .await
        .context("pausing campaign for spam")?;
        Ok(())
    }

    /// Operator-initiated pause (stop). In-flight `processing` rows are left
    /// to finish; no new rows get claimed once `status != 'running'`.
    #[instrument(skip(self))]
    pub async fn stop_campaign(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE campaigns SET status = 'paused' WHERE id = $1 AND status = 'running'")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("stopping campaign")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn resume_campaign(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE campaigns
             SET status = 'running', spam_paused_until = NULL, pause_reason = NULL
             WHERE id = $1 AND status = 'paused'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("resuming campaign")?;
        Ok(())
    }

    /// Rejected by the orchestration layer when status = running; this is
    /// the cascade delete (campaign_contacts/send_queue reference ON DELETE CASCADE).
    #[instrument(skip(self))]
    pub async fn delete_campaign(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting campaign")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn increment_total_sent(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE campaigns SET total_sent = total_sent + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("incrementing total_sent")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn increment_total_failed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE campaigns SET total_failed = total_failed + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("incrementing total_failed")?;
        Ok(())
    }

    /// Conditional update: only advances if the observed index still
    /// matches, to prevent lost updates under concurrent workers (§5).
    #[instrument(skip(self))]
    pub async fn advance_template_index(
        &self,
        id: Uuid,
        observed_index: i32,
        new_index: i32,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE campaigns SET current_template_index = $3
             WHERE id = $1 AND current_template_index = $2",
        )
        .bind(id)
        .bind(observed_index)
        .bind(new_index)
        .execute(&self.pool)
        .await
        .context("advancing template index")?;
        Ok(result.rows_affected() > 0)
    }
}
