//! Reminder ledger entities (database row mappings).

use chrono::{DateTime, Utc};
use domain::models::reminder::{ReminderCandidate, ReminderSentRecord, ReminderType};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the event_reminders_sent table.
#[derive(Debug, Clone, FromRow)]
pub struct ReminderSentEntity {
    pub id: Uuid,
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub reminder_type: String,
    pub recipient_email: String,
    pub sent_at: DateTime<Utc>,
}

impl TryFrom<ReminderSentEntity> for ReminderSentRecord {
    type Error = sqlx::Error;

    fn try_from(entity: ReminderSentEntity) -> Result<Self, Self::Error> {
        let reminder_type = ReminderType::parse(&entity.reminder_type).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown reminder type {}", entity.reminder_type).into())
        })?;
        Ok(Self {
            id: entity.id,
            event_id: entity.event_id,
            registration_id: entity.registration_id,
            reminder_type,
            recipient_email: entity.recipient_email,
            sent_at: entity.sent_at,
        })
    }
}

/// Row selected by the reminder job.
#[derive(Debug, Clone, FromRow)]
pub struct ReminderCandidateEntity {
    pub event_id: Uuid,
    pub event_title: String,
    pub event_starts_at: DateTime<Utc>,
    pub registration_id: Uuid,
    pub recipient_email: String,
}

impl From<ReminderCandidateEntity> for ReminderCandidate {
    fn from(entity: ReminderCandidateEntity) -> Self {
        Self {
            event_id: entity.event_id,
            event_title: entity.event_title,
            event_starts_at: entity.event_starts_at,
            registration_id: entity.registration_id,
            recipient_email: entity.recipient_email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(reminder_type: &str) -> ReminderSentEntity {
        ReminderSentEntity {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            registration_id: Uuid::new_v4(),
            reminder_type: reminder_type.to_string(),
            recipient_email: "guest@example.com".to_string(),
            sent_at: Utc::now(),
        }
    }

    #[test]
    fn test_reminder_entity_to_domain() {
        let record = ReminderSentRecord::try_from(entity("2day")).unwrap();
        assert_eq!(record.reminder_type, ReminderType::TwoDays);
    }

    #[test]
    fn test_unknown_reminder_type_is_decode_error() {
        assert!(matches!(
            ReminderSentRecord::try_from(entity("5day")),
            Err(sqlx::Error::Decode(_))
        ));
    }
}
