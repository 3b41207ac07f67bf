//! Relational persistence for the Campaign Send Engine: one typed repository
//! method set per aggregate, sharing a single connection pool. Manual
//! `sqlx::query` binding rather than the compile-time `query!` macros,
//! `#[instrument(skip(self))]` on every method, `anyhow::Result` return
//! types. Backed by Postgres — the Queue Processor's claim-batch step needs
//! `FOR UPDATE SKIP LOCKED`.

mod campaigns;
mod contacts;
mod messages;
mod notifications;
mod queue;
mod reply_limits;
mod rows;
mod senders;
mod status_logs;
mod templates;

pub use queue::TemplateQueueCounts;
pub use rows::*;
pub use status_logs::DeliveryCounts;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::instrument;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[instrument]
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// For tests and callers that already have a pool (e.g. a shared test fixture).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
