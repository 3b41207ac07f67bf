//! Row shapes as they come back from Postgres, and the conversions into the
//! plain domain structs `outreach-core` exposes to the rest of the engine.
//! Kept separate from `outreach_core::domain` because `sqlx::FromRow` wants
//! flat, driver-mappable field types (`sqlx::types::Json<...>` for jsonb,
//! `Vec<String>` for `text[]`) rather than the `HashMap`s the domain types
//! use for ergonomics.

use std::collections::HashMap;

use outreach_core::domain::{
    Campaign, CampaignContact, CampaignStatus, DeliveryStatus, Message, MessageDirection,
    MessageStatusLog, Notification, NotificationKind, QueueStatus, Sender, SendQueueEntry,
    Template, TemplateCategory, TemplateStatus, UserReplyLimit,
};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub struct SenderRow {
    pub id: Uuid,
    pub external_phone_number_id: String,
    pub external_account_id: String,
    pub access_credential: String,
    pub max_send_rate_per_sec: i32,
    pub last_stable_rate_per_sec: i32,
    pub is_active: bool,
    pub verified_name: String,
    pub app_secret: String,
}

impl From<SenderRow> for Sender {
    fn from(r: SenderRow) -> Self {
        Sender {
            id: r.id,
            external_phone_number_id: r.external_phone_number_id,
            external_account_id: r.external_account_id,
            access_credential: r.access_credential,
            max_send_rate_per_sec: r.max_send_rate_per_sec as u32,
            last_stable_rate_per_sec: r.last_stable_rate_per_sec as u32,
            is_active: r.is_active,
            verified_name: r.verified_name,
            app_secret: r.app_secret,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct TemplateRow {
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

impl From<TemplateRow> for Template {
    fn from(r: TemplateRow) -> Self {
        Template {
            id: r.id,
            sender_id: r.sender_id,
            name: r.name,
            language: r.language,
            category: r.category,
            status: r.status,
            components: r.components,
            is_active: r.is_active,
            is_quarantined: r.is_quarantined,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct CampaignRow {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub name: String,
    pub template_names: Vec<String>,
    pub total_contacts: i64,
    pub invalid_contacts_count: i64,
    pub total_sent: i64,
    pub total_failed: i64,
    pub total_delivered: i64,
    pub total_read: i64,
    pub total_replied: i64,
    pub scheduled_start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub status: CampaignStatus,
    pub current_template_index: i32,
    pub spam_pause_count: i32,
    pub spam_paused_until: Option<chrono::DateTime<chrono::Utc>>,
    pub pause_reason: Option<String>,
}

impl From<CampaignRow> for Campaign {
    fn from(r: CampaignRow) -> Self {
        Campaign {
            id: r.id,
            sender_id: r.sender_id,
            name: r.name,
            template_names: r.template_names,
            total_contacts: r.total_contacts,
            invalid_contacts_count: r.invalid_contacts_count,
            total_sent: r.total_sent,
            total_failed: r.total_failed,
            total_delivered: r.total_delivered,
            total_read: r.total_read,
            total_replied: r.total_replied,
            scheduled_start_time: r.scheduled_start_time,
            start_time: r.start_time,
            end_time: r.end_time,
            status: r.status,
            current_template_index: r.current_template_index,
            spam_pause_count: r.spam_pause_count,
            spam_paused_until: r.spam_paused_until,
            pause_reason: r.pause_reason,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct CampaignContactRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub phone: String,
    pub template_name: Option<String>,
    pub variables: Json<HashMap<String, String>>,
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
}

impl From<CampaignContactRow> for CampaignContact {
    fn from(r: CampaignContactRow) -> Self {
        CampaignContact {
            id: r.id,
            campaign_id: r.campaign_id,
            phone: r.phone,
            template_name: r.template_name,
            variables: r.variables.0,
            is_valid: r.is_valid,
            invalid_reason: r.invalid_reason,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct SendQueueRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub sender_id: Uuid,
    pub template_name: String,
    pub template_order: i32,
    pub phone: String,
    pub payload: Json<HashMap<String, String>>,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    pub whatsapp_message_id: Option<String>,
    pub actual_sent_at: Option<chrono::DateTime<chrono::Utc>>,
    pub sent_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub spam_error_detected: bool,
}

impl From<SendQueueRow> for SendQueueEntry {
    fn from(r: SendQueueRow) -> Self {
        SendQueueEntry {
            id: r.id,
            campaign_id: r.campaign_id,
            sender_id: r.sender_id,
            template_name: r.template_name,
            template_order: r.template_order,
            phone: r.phone,
            payload: r.payload.0,
            status: r.status,
            retry_count: r.retry_count,
            next_retry_at: r.next_retry_at,
            whatsapp_message_id: r.whatsapp_message_id,
            actual_sent_at: r.actual_sent_at,
            sent_at: r.sent_at,
            updated_at: r.updated_at,
            spam_error_detected: r.spam_error_detected,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub user_phone: String,
    pub direction: MessageDirection,
    pub message_type: String,
    pub message_body: Option<String>,
    pub whatsapp_message_id: Option<String>,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<MessageRow> for Message {
    fn from(r: MessageRow) -> Self {
        Message {
            id: r.id,
            sender_id: r.sender_id,
            campaign_id: r.campaign_id,
            user_phone: r.user_phone,
            direction: r.direction,
            message_type: r.message_type,
            message_body: r.message_body,
            whatsapp_message_id: r.whatsapp_message_id,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct MessageStatusLogRow {
    pub id: Uuid,
    pub whatsapp_message_id: String,
    pub campaign_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub status: DeliveryStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<MessageStatusLogRow> for MessageStatusLog {
    fn from(r: MessageStatusLogRow) -> Self {
        MessageStatusLog {
            id: r.id,
            whatsapp_message_id: r.whatsapp_message_id,
            campaign_id: r.campaign_id,
            sender_id: r.sender_id,
            status: r.status,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct UserReplyLimitRow {
    pub user_phone: String,
    pub reply_count: i64,
    pub last_reply_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserReplyLimitRow> for UserReplyLimit {
    fn from(r: UserReplyLimitRow) -> Self {
        UserReplyLimit {
            user_phone: r.user_phone,
            reply_count: r.reply_count,
            last_reply_at: r.last_reply_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub campaign_id: Option<Uuid>,
    pub sender_id: Option<Uuid>,
    pub message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub read_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<NotificationRow> for Notification {
    fn from(r: NotificationRow) -> Self {
        Notification {
            id: r.id,
            kind: r.kind,
            campaign_id: r.campaign_id,
            sender_id: r.sender_id,
            message: r.message,
            created_at: r.created_at,
            read_at: r.read_at,
        }
    }
}
