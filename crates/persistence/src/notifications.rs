use anyhow::{Context, Result};
use outreach_core::domain::Notification;
use tracing::instrument;
use uuid::Uuid;

use crate::rows::NotificationRow;
use crate::PgStore;

impl PgStore {
    #[instrument(skip(self, notification))]
    pub async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, kind, campaign_id, sender_id, message, created_at, read_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)",
        )
        .bind(notification.id)
        .bind(notification.kind)
        .bind(notification.campaign_id)
        .bind(notification.sender_id)
        .bind(&notification.message)
        .bind(notification.created_at)
        .bind(notification.read_at)
        .execute(&self.pool)
        .await
        .context("inserting notification")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>> {
        let rows = if unread_only {
            sqlx::query_as::<_, NotificationRow>(
                "SELECT * FROM notifications WHERE read_at IS NULL ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, NotificationRow>(
                "SELECT * FROM notifications ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await
        }
        .context("listing notifications")?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn mark_notification_read(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE notifications SET read_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("marking notification read")?;
        Ok(())
    }
}
