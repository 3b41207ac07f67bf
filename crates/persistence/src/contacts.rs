use anyhow::{Context, Result};
use outreach_core::domain::CampaignContact;
use sqlx::types::Json;
use tracing::instrument;
use uuid::Uuid;

use crate::rows::CampaignContactRow;
use crate::PgStore;

impl PgStore {
    #[instrument(skip(self, contacts))]
    pub async fn insert_contacts(&self, contacts: &[CampaignContact]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("beginning contacts tx")?;
        for c in contacts {
            sqlx::query(
                "INSERT INTO campaign_contacts
                    (id, campaign_id, phone, template_name, variables, is_valid, invalid_reason)
                 VALUES ($1,$2,$3,$4,$5,$6,$7)",
            )
            .bind(c.id)
            .bind(c.campaign_id)
            .bind(&c.phone)
            .bind(&c.template_name)
            .bind(Json(&c.variables))
            .bind(c.is_valid)
            .bind(&c.invalid_reason)
            .execute(&mut *tx)
            .await
            .context("inserting campaign contact")?;
        }
        tx.commit().await.context("committing contacts tx")?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_valid_contacts(&self, campaign_id: Uuid) -> Result<Vec<CampaignContact>> {
        let rows = sqlx::query_as::<_, CampaignContactRow>(
            "SELECT * FROM campaign_contacts WHERE campaign_id = $1 AND is_valid = TRUE",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .context("listing valid contacts")?;
        Ok(rows.into_iter().map(CampaignContact::from).collect())
    }
}
