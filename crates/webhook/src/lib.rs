//! Webhook Ingestion (§4.4): verifies inbound WhatsApp Cloud API deliveries,
//! appends delivery-status events to the append-only log, records inbound
//! replies, and bumps per-user reply counters. Never writes a campaign's
//! counters directly — those are derived by the stats aggregator from the
//! log, not pushed here (§9 "append-only log + pull-based derivation").

pub mod error;
pub mod payload;
pub mod signature;

use std::sync::Arc;

use chrono::Utc;
use outreach_core::domain::{DeliveryStatus, Message, MessageDirection, MessageStatusLog};
use outreach_persistence::PgStore;
use tracing::{instrument, warn};
use uuid::Uuid;

pub use error::WebhookError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub status_events_recorded: usize,
    pub inbound_messages_recorded: usize,
}

pub struct WebhookProcessor {
    store: Arc<PgStore>,
}

impl WebhookProcessor {
    pub fn new(store: Arc<PgStore>) -> Self {
        Self { store }
    }

    /// Meta's subscription-verification handshake (a GET request carrying
    /// `hub.mode`, `hub.verify_token`, `hub.challenge`): echoes the
    /// challenge back only when the token matches `webhook_verify_token`.
    pub fn verify_subscription(
        mode: &str,
        token: &str,
        challenge: &str,
        expected_token: &str,
    ) -> Option<String> {
        if mode == "subscribe" && !expected_token.is_empty() && token == expected_token {
            Some(challenge.to_string())
        } else {
            None
        }
    }

    /// Verifies the request signature against every active sender's
    /// `app_secret` and returns the matching sender id — one inbound
    /// endpoint serves every sender, disambiguated by whose secret actually
    /// signs the body (§6 "Webhook contract").
    #[instrument(skip(self, body))]
    async fn matching_sender(&self, body: &[u8], signature_header: &str) -> Result<Uuid, WebhookError> {
        let senders = self.store.list_active_senders().await?;
        senders
            .into_iter()
            .find(|s| {
                !s.app_secret.is_empty() && signature::verify(signature_header, body, &s.app_secret)
            })
            .map(|s| s.id)
            .ok_or(WebhookError::SignatureMismatch)
    }

    #[instrument(skip(self, body))]
    pub async fn handle(&self, body: &[u8], signature_header: &str) -> Result<WebhookOutcome, WebhookError> {
        let sender_id = self.matching_sender(body, signature_header).await?;
        let envelope: payload::WebhookEnvelope = serde_json::from_slice(body)?;

        let mut outcome = WebhookOutcome::default();
        for entry in envelope.entry {
            for change in entry.changes {
                for status in &change.value.statuses {
                    match self.record_status(sender_id, status).await {
                        Ok(()) => outcome.status_events_recorded += 1,
                        Err(e) => warn!(wamid = %status.id, error = %e, "failed to record status update"),
                    }
                }
                for msg in &change.value.messages {
                    match self.record_inbound(sender_id, msg).await {
                        Ok(()) => outcome.inbound_messages_recorded += 1,
                        Err(e) => warn!(from = %msg.from, error = %e, "failed to record inbound message"),
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn record_status(&self, sender_id: Uuid, status: &payload::StatusUpdate) -> Result<(), WebhookError> {
        let delivery_status = match status.status.as_str() {
            "sent" => DeliveryStatus::Sent,
            "delivered" => DeliveryStatus::Delivered,
            "read" => DeliveryStatus::Read,
            "failed" => DeliveryStatus::Failed,
            other => {
                warn!(status = other, "unrecognized delivery status, ignoring");
                return Ok(());
            }
        };

        let campaign_id = self
            .store
            .find_queue_entry_by_wamid(&status.id)
            .await?
            .map(|entry| entry.campaign_id);

        self.store
            .append_status_log(&MessageStatusLog {
                id: Uuid::new_v4(),
                whatsapp_message_id: status.id.clone(),
                campaign_id,
                sender_id,
                status: delivery_status,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    async fn record_inbound(&self, sender_id: Uuid, msg: &payload::InboundMessage) -> Result<(), WebhookError> {
        let message_body = msg.text.as_ref().map(|t| t.body.clone());
        self.store
            .insert_message(&Message {
                id: Uuid::new_v4(),
                sender_id,
                campaign_id: None,
                user_phone: msg.from.clone(),
                direction: MessageDirection::Incoming,
                message_type: msg.message_type.clone(),
                message_body,
                whatsapp_message_id: Some(msg.id.clone()),
                status: "received".to_string(),
                created_at: Utc::now(),
            })
            .await?;

        self.store.increment_reply_count(&msg.from).await?;
        Ok(())
    }
}
