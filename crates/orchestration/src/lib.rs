//! The operator-facing surface — create/stop/resume/delete/retry-failed and
//! the stats aggregator — sitting above the raw repository methods,
//! validating inputs and composing several persistence calls into one unit
//! of work before the CLI or HTTP layer ever sees it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use outreach_core::csv_ingest::{parse_contacts, ParsedContact};
use outreach_core::domain::{Campaign, CampaignContact, CampaignStatus};
use outreach_core::error::{EngineError, ValidationError};
use outreach_persistence::PgStore;
use tracing::instrument;
use uuid::Uuid;

pub struct CampaignService {
    store: Arc<PgStore>,
    phone_country_prefix: String,
    phone_total_digits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CampaignStats {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    pub total_contacts: i64,
    pub invalid_contacts_count: i64,
    pub total_sent: i64,
    pub total_failed: i64,
    pub total_delivered: i64,
    pub total_read: i64,
    pub total_replied: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TemplateStats {
    pub template_name: String,
    pub total: i64,
    pub sent: i64,
    pub failed: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed_via_webhook: i64,
    pub unique_repliers: i64,
}

impl CampaignService {
    pub fn new(store: Arc<PgStore>, phone_country_prefix: String, phone_total_digits: usize) -> Self {
        Self {
            store,
            phone_country_prefix,
            phone_total_digits,
        }
    }

    /// Validates templates, parses the CSV, assigns contacts round-robin
    /// across the eligible templates, and persists everything as one
    /// campaign. Starts immediately unless `scheduled_start_time` is in the
    /// future, in which case the Scheduler Tick starts it later (§4.7).
    #[instrument(skip(self, csv_bytes))]
    pub async fn create(
        &self,
        sender_id: Uuid,
        name: String,
        template_names: Vec<String>,
        csv_bytes: &[u8],
        scheduled_start_time: Option<DateTime<Utc>>,
    ) -> Result<Campaign, EngineError> {
        if template_names.is_empty() {
            return Err(EngineError::Validation(ValidationError::EmptyTemplateList));
        }

        for template_name in &template_names {
            let template = self
                .store
                .get_template_by_name(sender_id, template_name)
                .await
                .map_err(EngineError::Persistence)?;
            match template {
                Some(t) if t.is_campaign_eligible() => {}
                _ => {
                    return Err(EngineError::Validation(ValidationError::TemplateNotEligible(
                        template_name.clone(),
                    )))
                }
            }
        }

        // The csv crate surfaces structural failures (bad header, unreadable
        // stream) without a line number; per-row phone failures are instead
        // captured inline as ParsedContact::invalid_reason, not an Err here.
        let parsed = parse_contacts(csv_bytes, &self.phone_country_prefix, self.phone_total_digits)
            .map_err(|e| {
                EngineError::Validation(ValidationError::MalformedCsvRow {
                    row: 0,
                    reason: e.to_string(),
                })
            })?;

        let valid_count = parsed.iter().filter(|c| c.is_valid).count();
        if valid_count == 0 {
            return Err(EngineError::Validation(ValidationError::NoValidContacts));
        }

        let campaign_id = Uuid::new_v4();
        let assignments = assign_templates_round_robin(&parsed, &template_names);
        let contacts: Vec<CampaignContact> = parsed
            .into_iter()
            .zip(assignments)
            .map(|(p, template_name)| CampaignContact {
                id: Uuid::new_v4(),
                campaign_id,
                phone: p.phone,
                template_name,
                variables: p.variables,
                is_valid: p.is_valid,
                invalid_reason: p.invalid_reason,
            })
            .collect();

        let total_contacts = contacts.len() as i64;
        let invalid_contacts_count = total_contacts - valid_count as i64;
        let starts_now = scheduled_start_time.map(|t| t <= Utc::now()).unwrap_or(true);

        let campaign = Campaign {
            id: campaign_id,
            sender_id,
            name,
            template_names,
            total_contacts,
            invalid_contacts_count,
            total_sent: 0,
            total_failed: 0,
            total_delivered: 0,
            total_read: 0,
            total_replied: 0,
            scheduled_start_time,
            start_time: if starts_now { Some(Utc::now()) } else { None },
            end_time: None,
            status: if starts_now {
                CampaignStatus::Running
            } else {
                CampaignStatus::Scheduled
            },
            current_template_index: 0,
            spam_pause_count: 0,
            spam_paused_until: None,
            pause_reason: None,
        };

        self.store
            .insert_campaign(&campaign)
            .await
            .map_err(EngineError::Persistence)?;

        // From here on, any failure rolls the whole create back by deleting
        // the campaign row rather than leaving it orphaned; campaign_contacts
        // and send_queue cascade-delete with it.
        if let Err(e) = self.store.insert_contacts(&contacts).await {
            let _ = self.store.delete_campaign(campaign_id).await;
            return Err(EngineError::Persistence(e));
        }

        if starts_now {
            if let Err(e) = self.store.materialize_queue_from_contacts(&campaign).await {
                let _ = self.store.delete_campaign(campaign_id).await;
                return Err(EngineError::Persistence(e));
            }
        }

        Ok(campaign)
    }

    pub async fn stop(&self, id: Uuid) -> Result<(), EngineError> {
        self.store.stop_campaign(id).await.map_err(EngineError::Persistence)
    }

    pub async fn resume(&self, id: Uuid) -> Result<(), EngineError> {
        self.store.resume_campaign(id).await.map_err(EngineError::Persistence)
    }

    /// Rejects deletion of a running campaign (§4.7) — it must be stopped first.
    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        let campaign = self
            .store
            .get_campaign(id)
            .await
            .map_err(EngineError::Persistence)?
            .ok_or(EngineError::CampaignNotFound(id))?;
        if campaign.status == CampaignStatus::Running {
            return Err(EngineError::CannotDeleteRunning(id));
        }
        self.store.delete_campaign(id).await.map_err(EngineError::Persistence)
    }

    pub async fn retry_failed(&self, id: Uuid) -> Result<u64, EngineError> {
        self.store.retry_failed_rows(id).await.map_err(EngineError::Persistence)
    }

    /// Stats aggregation (§4.6): queue-tracked sent/failed counters combined
    /// with log-derived delivered/read and distinct-replier counts, with no
    /// N+1 queries.
    #[instrument(skip(self))]
    pub async fn stats(&self, id: Uuid) -> Result<CampaignStats, EngineError> {
        let campaign = self
            .store
            .get_campaign(id)
            .await
            .map_err(EngineError::Persistence)?
            .ok_or(EngineError::CampaignNotFound(id))?;
        let delivery = self
            .store
            .campaign_delivery_counts(id)
            .await
            .map_err(EngineError::Persistence)?;
        let total_replied = self
            .store
            .count_distinct_repliers_for_campaign(id)
            .await
            .map_err(EngineError::Persistence)?;

        Ok(CampaignStats {
            campaign_id: id,
            status: campaign.status,
            total_contacts: campaign.total_contacts,
            invalid_contacts_count: campaign.invalid_contacts_count,
            total_sent: campaign.total_sent,
            total_failed: campaign.total_failed,
            total_delivered: delivery.delivered,
            total_read: delivery.read,
            total_replied,
        })
    }

    /// Per-template breakdown (§4.6): groups send_queue/status-log data by
    /// template_name in a single pass per counter source, rather than one
    /// query per template.
    #[instrument(skip(self))]
    pub async fn template_stats(&self, id: Uuid) -> Result<Vec<TemplateStats>, EngineError> {
        self.store
            .get_campaign(id)
            .await
            .map_err(EngineError::Persistence)?
            .ok_or(EngineError::CampaignNotFound(id))?;

        let queue_counts = self
            .store
            .template_queue_counts(id)
            .await
            .map_err(EngineError::Persistence)?;
        let delivery = self
            .store
            .template_delivery_counts(id)
            .await
            .map_err(EngineError::Persistence)?;
        let repliers = self
            .store
            .template_distinct_repliers(id)
            .await
            .map_err(EngineError::Persistence)?;

        Ok(queue_counts
            .into_iter()
            .map(|q| {
                let d = delivery.get(&q.template_name).copied().unwrap_or_default();
                let unique_repliers = repliers.get(&q.template_name).copied().unwrap_or(0);
                TemplateStats {
                    template_name: q.template_name,
                    total: q.total,
                    sent: q.sent,
                    failed: q.failed,
                    delivered: d.delivered,
                    read: d.read,
                    failed_via_webhook: d.failed,
                    unique_repliers,
                }
            })
            .collect())
    }
}

/// Round-robins valid contacts across `template_names` in CSV row order;
/// invalid contacts get no template assignment.
fn assign_templates_round_robin(
    parsed: &[ParsedContact],
    template_names: &[String],
) -> Vec<Option<String>> {
    let mut valid_index = 0usize;
    parsed
        .iter()
        .map(|p| {
            if p.is_valid {
                let name = template_names[valid_index % template_names.len()].clone();
                valid_index += 1;
                Some(name)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(phone: &str) -> ParsedContact {
        ParsedContact {
            phone: phone.to_string(),
            variables: Default::default(),
            is_valid: true,
            invalid_reason: None,
        }
    }

    fn invalid(phone: &str) -> ParsedContact {
        ParsedContact {
            phone: phone.to_string(),
            variables: Default::default(),
            is_valid: false,
            invalid_reason: Some("bad phone".to_string()),
        }
    }

    #[test]
    fn round_robins_only_across_valid_contacts() {
        let contacts = vec![valid("1"), invalid("2"), valid("3"), valid("4")];
        let templates = vec!["a".to_string(), "b".to_string()];
        let assigned = assign_templates_round_robin(&contacts, &templates);
        assert_eq!(
            assigned,
            vec![Some("a".to_string()), None, Some("b".to_string()), Some("a".to_string())]
        );
    }

    #[test]
    fn single_template_assigns_every_valid_contact_the_same_name() {
        let contacts = vec![valid("1"), valid("2")];
        let templates = vec!["only".to_string()];
        let assigned = assign_templates_round_robin(&contacts, &templates);
        assert_eq!(assigned, vec![Some("only".to_string()), Some("only".to_string())]);
    }
}
