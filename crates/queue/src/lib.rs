//! The core send loop. Polls running campaigns, claims a batch under
//! `FOR UPDATE SKIP LOCKED`, dispatches through the rate-gated provider,
//! persists outcomes, advances template order, and watches for spam
//! auto-pause and campaign completion. Structured as one `run()` poll loop
//! on a fixed interval, fanning out over every running campaign each tick
//! instead of a fixed job list.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use outreach_core::config::EngineConfig;
use outreach_core::domain::{
    Campaign, CampaignStatus, Notification, NotificationKind, SendOutcome, SendQueueEntry,
};
use outreach_persistence::PgStore;
use outreach_provider::client::WhatsAppClient;
use outreach_ratelimit::RateController;
use tracing::{info, instrument, warn};

mod backoff;

/// How many ticks between stuck-row reaper sweeps. At the default 100ms
/// tick this runs roughly once a minute; it doesn't need to run every tick.
const REAP_EVERY_N_TICKS: u32 = 600;

pub struct QueueProcessor {
    store: Arc<PgStore>,
    client: Arc<WhatsAppClient>,
    rates: Arc<RateController>,
    config: EngineConfig,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<PgStore>,
        client: Arc<WhatsAppClient>,
        rates: Arc<RateController>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            client,
            rates,
            config,
        }
    }

    /// Polls forever at `config.tick_ms` until `shutdown` flips true.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_ms));
        let mut ticks_since_reap: u32 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "queue processor tick failed");
                    }

                    ticks_since_reap += 1;
                    if ticks_since_reap >= REAP_EVERY_N_TICKS {
                        ticks_since_reap = 0;
                        if let Err(e) = self.reap_stuck().await {
                            warn!(error = %e, "stuck-row reaper failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("queue processor shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Reclaims `processing` rows idle past the grace period back to `ready`
    /// (§7 "Internal" taxonomy entry — a worker that crashed mid-dispatch
    /// leaves rows stuck in `processing` otherwise).
    #[instrument(skip(self))]
    pub async fn reap_stuck(&self) -> Result<()> {
        let n = self
            .store
            .reap_stuck_processing(self.config.processing_grace_minutes)
            .await
            .context("reaping stuck processing rows")?;
        if n > 0 {
            info!(reclaimed = n, "reclaimed stuck processing rows");
        }
        Ok(())
    }

    /// One full tick across every running campaign.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<()> {
        let campaigns = self
            .store
            .list_running_campaigns()
            .await
            .context("listing running campaigns")?;

        for campaign in campaigns {
            if let Err(e) = self.process_campaign(&campaign).await {
                warn!(campaign_id = %campaign.id, error = %e, "campaign tick failed");
            }
        }
        Ok(())
    }

    #[instrument(skip(self, campaign), fields(campaign_id = %campaign.id))]
    async fn process_campaign(&self, campaign: &Campaign) -> Result<()> {
        let batch = self
            .store
            .claim_batch(
                campaign.id,
                campaign.current_template_index,
                self.config.batch_size,
            )
            .await
            .context("claiming batch")?;

        for entry in &batch {
            match self.dispatch_one(campaign, entry).await {
                Ok(true) => return Ok(()), // campaign went fatal; stop this tick's work
                Ok(false) => {}
                Err(e) => warn!(entry_id = %entry.id, error = %e, "dispatch failed"),
            }
        }

        self.advance_templates(campaign)
            .await
            .context("advancing template index")?;
        self.check_spam_pause(campaign)
            .await
            .context("checking spam auto-pause")?;
        self.check_completion(campaign)
            .await
            .context("checking campaign completion")?;
        Ok(())
    }

    /// Dispatches a single claimed row. Returns `Ok(true)` if the outcome
    /// was campaign-fatal (auth revoked), so the caller stops working this
    /// campaign for the rest of the tick.
    async fn dispatch_one(&self, campaign: &Campaign, entry: &SendQueueEntry) -> Result<bool> {
        let sender = self
            .store
            .get_sender(entry.sender_id)
            .await?
            .context("queue row references a sender that no longer exists")?;
        let template = self
            .store
            .get_template_by_name(entry.sender_id, &entry.template_name)
            .await?;

        let outcome = match template {
            Some(t) => {
                self.rates
                    .acquire(sender.id, sender.max_send_rate_per_sec)
                    .await;
                self.client
                    .send_template(
                        &sender.access_credential,
                        &sender.external_phone_number_id,
                        &entry.phone,
                        &entry.template_name,
                        &t.language,
                        &entry.payload,
                        &t.components,
                    )
                    .await
            }
            None => SendOutcome::PermanentFail {
                code: None,
                message: format!("template '{}' no longer exists", entry.template_name),
            },
        };

        if let Some(adjustment) = self.rates.observe(sender.id, &outcome).await {
            self.store
                .update_sender_rate(
                    sender.id,
                    adjustment.new_last_stable_rate.map(|r| r as i32),
                )
                .await?;
        }

        let now = Utc::now();
        match outcome {
            SendOutcome::Ok { wamid } => {
                if let Some(existing) = self.store.queue_row_with_wamid(&wamid).await? {
                    if existing != entry.id {
                        warn!(
                            wamid = %wamid,
                            entry_id = %entry.id,
                            existing_id = %existing,
                            "wamid already recorded against another row; marking sent without a second dispatch"
                        );
                    }
                }
                self.store.mark_sent(entry.id, &wamid, now).await?;
                self.store.increment_total_sent(campaign.id).await?;
                Ok(false)
            }
            SendOutcome::TransientFail { .. } | SendOutcome::RateLimited => {
                self.retry_or_fail(campaign, entry, false).await?;
                Ok(false)
            }
            SendOutcome::SpamRateLimited => {
                self.retry_or_fail(campaign, entry, true).await?;
                Ok(false)
            }
            SendOutcome::PermanentFail { .. } => {
                self.store.mark_permanent_fail(entry.id).await?;
                self.store.increment_total_failed(campaign.id).await?;
                Ok(false)
            }
            SendOutcome::CampaignFatal { message } => {
                self.store.mark_permanent_fail(entry.id).await?;
                self.store.mark_campaign_fatal(campaign.id).await?;
                self.store
                    .insert_notification(
                        &Notification::new(NotificationKind::CampaignFatal, message)
                            .with_campaign(campaign.id)
                            .with_sender(sender.id),
                    )
                    .await?;
                Ok(true)
            }
        }
    }

    /// Applies the exponential-backoff-with-jitter retry (§4.2 step 4), or
    /// permanently fails the row once `max_retries` is exceeded.
    async fn retry_or_fail(
        &self,
        campaign: &Campaign,
        entry: &SendQueueEntry,
        spam_detected: bool,
    ) -> Result<()> {
        let retry_count = entry.retry_count + 1;
        if retry_count > self.config.max_retries {
            self.store.mark_permanent_fail(entry.id).await?;
            self.store.increment_total_failed(campaign.id).await?;
        } else {
            let next = backoff::next_retry_at(
                retry_count,
                self.config.backoff_base_seconds,
                self.config.backoff_max_seconds,
                Utc::now(),
            );
            self.store
                .mark_retry(entry.id, retry_count, next, spam_detected)
                .await?;
        }
        Ok(())
    }

    /// Advances `current_template_index` as far forward as the blocking
    /// predicate allows. Retry rows of the current index never block
    /// advancement — only unattempted (`retry_count = 0`) rows do (§9).
    async fn advance_templates(&self, campaign: &Campaign) -> Result<()> {
        let mut observed = campaign.current_template_index;
        loop {
            let next = observed + 1;
            if next as usize >= campaign.template_names.len() {
                break;
            }
            if self
                .store
                .has_blocking_first_attempts(campaign.id, observed)
                .await?
            {
                break;
            }
            if !self
                .store
                .advance_template_index(campaign.id, observed, next)
                .await?
            {
                break; // another worker already advanced it
            }
            observed = next;
        }
        Ok(())
    }

    /// Spam auto-pause (§4.2.a): first offense pauses for a fixed window
    /// and auto-resumes via the scheduler; a second offense within the
    /// campaign's lifetime pauses indefinitely pending a manual resume.
    async fn check_spam_pause(&self, campaign: &Campaign) -> Result<()> {
        let detections = self
            .store
            .count_recent_spam_detections(campaign.id, self.config.spam_window_minutes)
            .await?;
        if detections < self.config.spam_threshold {
            return Ok(());
        }

        if campaign.spam_pause_count == 0 {
            let resume_at =
                Utc::now() + chrono::Duration::minutes(self.config.spam_first_pause_minutes);
            self.store
                .pause_campaign_for_spam(
                    campaign.id,
                    1,
                    Some(resume_at),
                    "spam rate limiting detected; auto-resuming",
                )
                .await?;
            self.store
                .insert_notification(
                    &Notification::new(
                        NotificationKind::SpamPauseFirst,
                        format!(
                            "campaign '{}' paused for spam rate limiting; auto-resume scheduled",
                            campaign.name
                        ),
                    )
                    .with_campaign(campaign.id),
                )
                .await?;
        } else {
            self.store
                .pause_campaign_for_spam(
                    campaign.id,
                    campaign.spam_pause_count + 1,
                    None,
                    "spam rate limiting detected a second time; manual resume required",
                )
                .await?;
            self.store
                .insert_notification(
                    &Notification::new(
                        NotificationKind::SpamPausePermanent,
                        format!(
                            "campaign '{}' paused for spam rate limiting a second time; manual resume required",
                            campaign.name
                        ),
                    )
                    .with_campaign(campaign.id),
                )
                .await?;
        }
        Ok(())
    }

    /// A campaign is complete once no rows remain open and every contact's
    /// row has resolved to either `sent` or `failed` (§4.2 step 5).
    async fn check_completion(&self, campaign: &Campaign) -> Result<()> {
        let open = self.store.count_open_rows(campaign.id).await?;
        if open > 0 {
            return Ok(());
        }

        let fresh = self
            .store
            .get_campaign(campaign.id)
            .await?
            .context("campaign disappeared mid-tick")?;
        if fresh.status != CampaignStatus::Running {
            return Ok(());
        }
        if fresh.total_sent + fresh.total_failed < fresh.total_contacts {
            return Ok(()); // rows for every contact haven't materialized yet
        }

        self.store.mark_campaign_completed(campaign.id).await?;
        self.store
            .insert_notification(
                &Notification::new(
                    NotificationKind::CampaignCompleted,
                    format!("campaign '{}' completed", campaign.name),
                )
                .with_campaign(campaign.id),
            )
            .await?;
        Ok(())
    }
}
