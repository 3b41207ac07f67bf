use anyhow::{Context, Result};
use tracing::instrument;

use crate::PgStore;

impl PgStore {
    /// Increment the reply counter for a known user, inserting the row on
    /// first reply (§4.4 point 4).
    #[instrument(skip(self))]
    pub async fn increment_reply_count(&self, user_phone: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_reply_limits (user_phone, reply_count, last_reply_at)
             VALUES ($1, 1, now())
             ON CONFLICT (user_phone)
             DO UPDATE SET reply_count = user_reply_limits.reply_count + 1, last_reply_at = now()",
        )
        .bind(user_phone)
        .execute(&self.pool)
        .await
        .context("incrementing reply count")?;
        Ok(())
    }
}
