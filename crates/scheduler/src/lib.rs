//! A low-frequency sweep, separate from the Queue Processor's fast poll,
//! that starts campaigns whose `scheduled_start_time` has arrived and
//! auto-resumes campaigns paused by a first spam offense. A fixed-interval
//! scan-and-act loop backed entirely by persisted campaign state — there is
//! no cron-job schedule language here, just the two due-queries the data
//! model already expresses.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use outreach_core::domain::CampaignStatus;
use outreach_persistence::PgStore;
use tracing::{info, instrument, warn};

pub struct SchedulerService {
    store: Arc<PgStore>,
    tick_seconds: u64,
}

impl SchedulerService {
    pub fn new(store: Arc<PgStore>, tick_seconds: u64) -> Self {
        Self { store, tick_seconds }
    }

    /// Runs forever at `tick_seconds` until `shutdown` flips true.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.tick_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        return;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<()> {
        self.start_due_campaigns().await.context("starting due campaigns")?;
        self.resume_due_spam_pauses().await.context("resuming spam-paused campaigns")?;
        Ok(())
    }

    /// Materializes one `send_queue` row per valid contact and flips the
    /// campaign to `running` (§4.5 point 1).
    async fn start_due_campaigns(&self) -> Result<()> {
        let due = self.store.list_due_scheduled_campaigns().await?;
        for campaign in due {
            let rows = self.store.materialize_queue_from_contacts(&campaign).await?;
            self.store
                .set_campaign_status(campaign.id, CampaignStatus::Running, Some(Utc::now()))
                .await?;
            info!(campaign_id = %campaign.id, rows, "started scheduled campaign");
        }
        Ok(())
    }

    /// Auto-resumes first-offense spam pauses once their window elapses,
    /// clearing the spam flags so the window starts fresh (§9).
    async fn resume_due_spam_pauses(&self) -> Result<()> {
        let due = self.store.list_due_spam_resumes().await?;
        for campaign in due {
            self.store.resume_campaign(campaign.id).await?;
            self.store.clear_spam_flags(campaign.id).await?;
            info!(campaign_id = %campaign.id, "auto-resumed campaign after first spam pause");
        }
        Ok(())
    }
}
