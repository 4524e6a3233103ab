//! Payment notification ledger entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::PaymentNotificationRecord;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the payment_notifications table.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentNotificationEntity {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub dead_lettered: bool,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentNotificationEntity> for PaymentNotificationRecord {
    fn from(entity: PaymentNotificationEntity) -> Self {
        Self {
            id: entity.id,
            provider_event_id: entity.provider_event_id,
            event_type: entity.event_type,
            payload: entity.payload,
            processed: entity.processed,
            processed_at: entity.processed_at,
            attempt_count: entity.attempt_count,
            last_error: entity.last_error,
            last_attempt_at: entity.last_attempt_at,
            dead_lettered: entity.dead_lettered,
            review_note: entity.review_note,
            created_at: entity.created_at,
        }
    }
}

/// Ledger flags read back when a claim does not succeed.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct LedgerStateEntity {
    pub processed: bool,
    pub dead_lettered: bool,
    pub attempt_count: i32,
}
