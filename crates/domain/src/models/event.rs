//! Event model (supporting data; catalog management lives elsewhere).

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::money::Money;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Price per attendee. `None` means free.
    pub ticket_price: Option<Money>,
}

impl Event {
    pub fn is_free(&self) -> bool {
        self.ticket_price.as_ref().map_or(true, Money::is_zero)
    }

    /// Total for `attendee_count` places, `None` for free events or overflow.
    pub fn total_price(&self, attendee_count: i32) -> Option<Money> {
        if self.is_free() {
            return None;
        }
        self.ticket_price.as_ref()?.times(attendee_count)
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(price: Option<Money>) -> Event {
        let starts_at = Utc::now() + Duration::days(3);
        Event {
            id: Uuid::new_v4(),
            title: "Sinhala New Year Festival".into(),
            starts_at,
            ends_at: starts_at + Duration::hours(6),
            ticket_price: price,
        }
    }

    #[test]
    fn test_free_events() {
        assert!(event(None).is_free());
        assert!(event(Some(Money::new(0, "USD"))).is_free());
        assert!(!event(Some(Money::new(1500, "USD"))).is_free());
    }

    #[test]
    fn test_total_price() {
        assert_eq!(event(None).total_price(3), None);
        assert_eq!(
            event(Some(Money::new(1500, "USD"))).total_price(3),
            Some(Money::new(4500, "USD"))
        );
    }

    #[test]
    fn test_has_ended() {
        let e = event(None);
        assert!(!e.has_ended(Utc::now()));
        assert!(e.has_ended(e.ends_at));
    }
}
