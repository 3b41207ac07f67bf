use std::collections::HashMap;

use anyhow::{Context, Result};
use outreach_core::domain::Message;
use tracing::instrument;
use uuid::Uuid;

use crate::rows::MessageRow;
use crate::PgStore;

impl PgStore {
    #[instrument(skip(self, message))]
    pub async fn insert_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages
                (id, sender_id, campaign_id, user_phone, direction, message_type, message_body,
                 whatsapp_message_id, status, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
             ON CONFLICT DO NOTHING",
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.campaign_id)
        .bind(&message.user_phone)
        .bind(message.direction)
        .bind(&message.message_type)
        .bind(&message.message_body)
        .bind(&message.whatsapp_message_id)
        .bind(&message.status)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .context("inserting message")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_outgoing_by_wamid(&self, wamid: &str) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE direction = 'outgoing' AND whatsapp_message_id = $1",
        )
        .bind(wamid)
        .fetch_optional(&self.pool)
        .await
        .context("finding outgoing message by wamid")?;
        Ok(row.map(Message::from))
    }

    /// Distinct repliers: incoming messages from `user_phone`s that also
    /// received an outgoing campaign message, used by the stats aggregator.
    #[instrument(skip(self))]
    pub async fn count_distinct_repliers_for_campaign(&self, campaign_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(DISTINCT m_in.user_phone)
             FROM messages m_in
             JOIN messages m_out
               ON m_out.campaign_id = $1
              AND m_out.direction = 'outgoing'
              AND m_out.sender_id = m_in.sender_id
              AND m_out.user_phone = m_in.user_phone
             WHERE m_in.direction = 'incoming'",
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
        .context("counting distinct repliers")?;
        Ok(count)
    }

    /// Same distinct-replier rule as `count_distinct_repliers_for_campaign`,
    /// grouped by the `send_queue` row's template_name via phone match.
    #[instrument(skip(self))]
    pub async fn template_distinct_repliers(&self, campaign_id: Uuid) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sq.template_name, count(DISTINCT m_in.user_phone)
             FROM send_queue sq
             JOIN messages m_in
               ON m_in.direction = 'incoming'
              AND m_in.sender_id = sq.sender_id
              AND m_in.user_phone = sq.phone
             WHERE sq.campaign_id = $1
             GROUP BY sq.template_name",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .context("counting per-template distinct repliers")?;
        Ok(rows.into_iter().collect())
    }
}
