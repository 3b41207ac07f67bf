use anyhow::{Context, Result};
use outreach_core::domain::Template;
use tracing::instrument;
use uuid::Uuid;

use crate::rows::TemplateRow;
use crate::PgStore;

impl PgStore {
    #[instrument(skip(self))]
    pub async fn get_template_by_name(
        &self,
        sender_id: Uuid,
        name: &str,
    ) -> Result<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT * FROM templates WHERE sender_id = $1 AND name = $2",
        )
        .bind(sender_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("fetching template by name")?;
        Ok(row.map(Template::from))
    }

    #[instrument(skip(self))]
    pub async fn list_templates_for_sender(&self, sender_id: Uuid) -> Result<Vec<Template>> {
        let rows = sqlx::query_as::<_, TemplateRow>(
            "SELECT * FROM templates WHERE sender_id = $1 ORDER BY name",
        )
        .bind(sender_id)
        .fetch_all(&self.pool)
        .await
        .context("listing templates for sender")?;
        Ok(rows.into_iter().map(Template::from).collect())
    }
}
