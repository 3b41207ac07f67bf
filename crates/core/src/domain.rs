use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// A configured business phone number through which campaigns send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: Uuid,
    pub external_phone_number_id: String,
    pub external_account_id: String,
    pub access_credential: String,
    pub max_send_rate_per_sec: u32,
    pub last_stable_rate_per_sec: u32,
    pub is_active: bool,
    pub verified_name: String,
    /// Used to verify the HMAC signature on inbound webhooks for this sender.
    pub app_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "template_category", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TemplateCategory {
    Utility,
    Marketing,
    Authentication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "template_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TemplateStatus {
    Approved,
    Pending,
    Rejected,
}

/// Pre-approved, parameterized message body. Eligible for bulk send only
/// when approved, active, non-quarantined, and non-marketing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub name: String,
    pub language: String,
    pub category: TemplateCategory,
    pub status: TemplateStatus,
    pub components: serde_json::Value,
    pub is_active: bool,
    pub is_quarantined: bool,
}

impl Template {
    /// Eligible for bulk campaign use per the glossary's Template/Quarantine definitions.
    pub fn is_campaign_eligible(&self) -> bool {
        self.status == TemplateStatus::Approved
            && self.is_active
            && !self.is_quarantined
            && self.category != TemplateCategory::Marketing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Scheduled,
    Running,
    Paused,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub name: String,
    /// Ordered list of template names eligible on this sender, in send order.
    pub template_names: Vec<String>,
    pub total_contacts: i64,
    pub invalid_contacts_count: i64,
    pub total_sent: i64,
    pub total_failed: i64,
    pub total_delivered: i64,
    pub total_read: i64,
    pub total_replied: i64,
    pub scheduled_start_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: CampaignStatus,
    pub current_template_index: i32,
    pub spam_pause_count: i32,
    pub spam_paused_until: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
}

impl Campaign {
    pub fn current_template_name(&self) -> Option<&str> {
        self.template_names
            .get(self.current_template_index as usize)
            .map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub phone: String,
    pub template_name: Option<String>,
    pub variables: HashMap<String, String>,
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "queue_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Ready,
    Processing,
    Sent,
    Failed,
}

/// One recipient-template pair awaiting dispatch, with its own retry lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendQueueEntry {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub sender_id: Uuid,
    pub template_name: String,
    /// Index of template_name in the owning campaign's template_names.
    pub template_order: i32,
    pub phone: String,
    pub payload: HashMap<String, String>,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub whatsapp_message_id: Option<String>,
    pub actual_sent_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub spam_error_detected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_direction", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub user_phone: String,
    pub direction: MessageDirection,
    pub message_type: String,
    pub message_body: Option<String>,
    pub whatsapp_message_id: Option<String>,
    pub status: String,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    // Ordinal order matters: this is the monotone hierarchy sent < delivered < read.
    // `Failed` sorts highest so a naive max() never lets it overwrite delivered/read;
    // callers must still apply the "ignore failed once delivered/read" rule explicitly
    // (see outreach-orchestration::stats), since failed is not actually "further along".
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Append-only log entry keyed by the provider-assigned WAMID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStatusLog {
    pub id: Uuid,
    pub whatsapp_message_id: String,
    pub campaign_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub status: DeliveryStatus,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReplyLimit {
    pub user_phone: String,
    pub reply_count: i64,
    pub last_reply_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CampaignCompleted,
    CampaignFatal,
    SpamPauseFirst,
    SpamPausePermanent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub campaign_id: Option<Uuid>,
    pub sender_id: Option<Uuid>,
    pub message: String,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            campaign_id: None,
            sender_id: None,
            message: message.into(),
            created_at: Utc::now(),
            read_at: None,
        }
    }

    pub fn with_campaign(mut self, campaign_id: Uuid) -> Self {
        self.campaign_id = Some(campaign_id);
        self
    }

    pub fn with_sender(mut self, sender_id: Uuid) -> Self {
        self.sender_id = Some(sender_id);
        self
    }
}

/// Outcome of a single outbound-client dispatch attempt, as handed from
/// outreach-provider up through outreach-ratelimit to the queue processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Ok { wamid: String },
    TransientFail { code: Option<String>, message: String },
    RateLimited,
    SpamRateLimited,
    PermanentFail { code: Option<String>, message: String },
    /// Credential revoked / auth failure: not per-row, it kills the whole campaign.
    CampaignFatal { message: String },
}
