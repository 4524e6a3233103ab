//! Reminder deduplication ledger repository.

use domain::models::ReminderType;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::{ReminderCandidateEntity, ReminderSentEntity};
use crate::metrics::QueryTimer;

/// Repository for the reminder ledger.
#[derive(Clone)]
pub struct ReminderRepository {
    pool: PgPool,
}

impl ReminderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert-if-absent against the (event, registration, type) constraint.
    ///
    /// `None` means another caller already recorded this reminder. A
    /// concurrent uncommitted insert makes this call wait for its outcome.
    pub async fn try_record(
        conn: &mut PgConnection,
        event_id: Uuid,
        registration_id: Uuid,
        reminder_type: ReminderType,
        recipient_email: &str,
    ) -> Result<Option<ReminderSentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("record_reminder_sent");
        let result = sqlx::query_as::<_, ReminderSentEntity>(
            r#"
            INSERT INTO event_reminders_sent (event_id, registration_id, reminder_type, recipient_email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id, registration_id, reminder_type) DO NOTHING
            RETURNING id, event_id, registration_id, reminder_type, recipient_email, sent_at
            "#,
        )
        .bind(event_id)
        .bind(registration_id)
        .bind(reminder_type.as_str())
        .bind(recipient_email)
        .fetch_optional(&mut *conn)
        .await;
        timer.record();
        result
    }

    /// Ticketable registrations of events starting inside `window` that have
    /// not received `reminder_type` yet, with their resolved recipient.
    pub async fn find_candidates(
        &self,
        reminder_type: ReminderType,
        window: (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>),
        limit: i64,
    ) -> Result<Vec<ReminderCandidateEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_reminder_candidates");
        let result = sqlx::query_as::<_, ReminderCandidateEntity>(
            r#"
            SELECT e.id AS event_id,
                   e.title AS event_title,
                   e.starts_at AS event_starts_at,
                   r.id AS registration_id,
                   COALESCE(u.email, r.contact->>'email', r.attendee_info->>'email') AS recipient_email
            FROM registrations r
            JOIN events e ON e.id = r.event_id
            LEFT JOIN users u ON u.id = r.user_id
            WHERE e.starts_at >= $2
              AND e.starts_at < $3
              AND r.payment_status IN ('paid', 'not_required')
              AND COALESCE(u.email, r.contact->>'email', r.attendee_info->>'email') IS NOT NULL
              AND NOT EXISTS (
                  SELECT 1 FROM event_reminders_sent s
                  WHERE s.event_id = e.id
                    AND s.registration_id = r.id
                    AND s.reminder_type = $1
              )
            ORDER BY e.starts_at, r.id
            LIMIT $4
            "#,
        )
        .bind(reminder_type.as_str())
        .bind(window.0)
        .bind(window.1)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Number of ledger rows for a triple; 0 or 1.
    pub async fn count_sent(
        &self,
        event_id: Uuid,
        registration_id: Uuid,
        reminder_type: ReminderType,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM event_reminders_sent
            WHERE event_id = $1 AND registration_id = $2 AND reminder_type = $3
            "#,
        )
        .bind(event_id)
        .bind(registration_id)
        .bind(reminder_type.as_str())
        .fetch_one(&self.pool)
        .await
    }
}
