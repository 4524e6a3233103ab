//! Event and user entities (supporting rows).

use chrono::{DateTime, Utc};
use domain::models::{Event, Money};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the events table.
#[derive(Debug, Clone, FromRow)]
pub struct EventEntity {
    pub id: Uuid,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub ticket_price_minor: Option<i64>,
    pub ticket_price_currency: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<EventEntity> for Event {
    fn from(entity: EventEntity) -> Self {
        Self {
            id: entity.id,
            title: entity.title,
            starts_at: entity.starts_at,
            ends_at: entity.ends_at,
            ticket_price: Money::from_parts(entity.ticket_price_minor, entity.ticket_price_currency),
        }
    }
}

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_event_entity_to_domain() {
        let now = Utc::now();
        let entity = EventEntity {
            id: Uuid::new_v4(),
            title: "Poson Dansal".to_string(),
            starts_at: now,
            ends_at: now + Duration::hours(4),
            ticket_price_minor: Some(1500),
            ticket_price_currency: Some("USD".to_string()),
            created_at: now,
        };
        let event: Event = entity.clone().into();
        assert_eq!(event.id, entity.id);
        assert_eq!(event.ticket_price, Some(Money::new(1500, "USD")));
        assert!(!event.is_free());
    }

    #[test]
    fn test_event_entity_without_price_is_free() {
        let now = Utc::now();
        let entity = EventEntity {
            id: Uuid::new_v4(),
            title: "Community Meetup".to_string(),
            starts_at: now,
            ends_at: now,
            ticket_price_minor: None,
            ticket_price_currency: None,
            created_at: now,
        };
        assert!(Event::from(entity).is_free());
    }
}
