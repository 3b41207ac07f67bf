use anyhow::{Context, Result};
use outreach_core::domain::Sender;
use tracing::instrument;
use uuid::Uuid;

use crate::rows::SenderRow;
use crate::PgStore;

impl PgStore {
    #[instrument(skip(self))]
    pub async fn get_sender(&self, id: Uuid) -> Result<Option<Sender>> {
        let row = sqlx::query_as::<_, SenderRow>("SELECT * FROM senders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching sender")?;
        Ok(row.map(Sender::from))
    }

    #[instrument(skip(self))]
    pub async fn list_active_senders(&self) -> Result<Vec<Sender>> {
        let rows = sqlx::query_as::<_, SenderRow>(
            "SELECT * FROM senders WHERE is_active = TRUE ORDER BY external_phone_number_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing active senders")?;
        Ok(rows.into_iter().map(Sender::from).collect())
    }

    /// Apply the rate controller's adaptive adjustment (§4.1). `last_stable`
    /// is only updated by the caller when the previous window was clean.
    #[instrument(skip(self))]
    pub async fn update_sender_rate(
        &self,
        sender_id: Uuid,
        last_stable_rate_per_sec: Option<i32>,
    ) -> Result<()> {
        if let Some(stable) = last_stable_rate_per_sec {
            sqlx::query("UPDATE senders SET last_stable_rate_per_sec = $2 WHERE id = $1")
                .bind(sender_id)
                .bind(stable)
                .execute(&self.pool)
                .await
                .context("updating sender stable rate")?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn deactivate_sender(&self, sender_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE senders SET is_active = FALSE WHERE id = $1")
            .bind(sender_id)
            .execute(&self.pool)
            .await
            .context("deactivating sender")?;
        Ok(())
    }
}
