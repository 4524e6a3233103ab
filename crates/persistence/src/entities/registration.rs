//! Registration entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::payment::PaymentStatus;
use domain::models::registration::{validate_format, Registration, RegistrationFields};
use domain::models::Money;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatusDb {
    NotRequired,
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl From<PaymentStatusDb> for PaymentStatus {
    fn from(db: PaymentStatusDb) -> Self {
        match db {
            PaymentStatusDb::NotRequired => PaymentStatus::NotRequired,
            PaymentStatusDb::Pending => PaymentStatus::Pending,
            PaymentStatusDb::Paid => PaymentStatus::Paid,
            PaymentStatusDb::Failed => PaymentStatus::Failed,
            PaymentStatusDb::Refunded => PaymentStatus::Refunded,
        }
    }
}

impl From<PaymentStatus> for PaymentStatusDb {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::NotRequired => PaymentStatusDb::NotRequired,
            PaymentStatus::Pending => PaymentStatusDb::Pending,
            PaymentStatus::Paid => PaymentStatusDb::Paid,
            PaymentStatus::Failed => PaymentStatusDb::Failed,
            PaymentStatus::Refunded => PaymentStatusDb::Refunded,
        }
    }
}

/// Database row mapping for the registrations table.
#[derive(Debug, Clone, FromRow)]
pub struct RegistrationEntity {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub attendee_info: Option<serde_json::Value>,
    pub attendees: Option<serde_json::Value>,
    pub contact: Option<serde_json::Value>,
    pub quantity: i32,
    pub total_amount_minor: Option<i64>,
    pub total_currency: Option<String>,
    pub payment_status: PaymentStatusDb,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub checkout_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationEntity {
    /// Decodes the JSONB attendee columns back into raw fields.
    pub fn fields(&self) -> Result<RegistrationFields, serde_json::Error> {
        Ok(RegistrationFields {
            user_id: self.user_id,
            attendee_info: decode(&self.attendee_info)?,
            attendees: decode(&self.attendees)?,
            contact: decode(&self.contact)?,
            quantity: Some(self.quantity),
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    value: &Option<serde_json::Value>,
) -> Result<Option<T>, serde_json::Error> {
    value.clone().map(serde_json::from_value).transpose()
}

/// A stored row that no longer matches a recognized shape is a decode failure.
impl TryFrom<RegistrationEntity> for Registration {
    type Error = sqlx::Error;

    fn try_from(entity: RegistrationEntity) -> Result<Self, Self::Error> {
        let fields = entity
            .fields()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let shape = validate_format(&fields).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            id: entity.id,
            event_id: entity.event_id,
            shape,
            total_price: Money::from_parts(entity.total_amount_minor, entity.total_currency),
            payment_status: entity.payment_status.into(),
            checkout_session_id: entity.checkout_session_id,
            payment_intent_id: entity.payment_intent_id,
            checkout_expires_at: entity.checkout_expires_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}
