//! Payment notification ledger repository.
//!
//! Every inbound provider notification is claimed here before any side
//! effect runs. The claim is taken inside the caller's transaction so the
//! row lock on `provider_event_id` serializes concurrent deliveries of the
//! same notification.

use domain::models::AttemptClaim;
use sqlx::{PgConnection, PgPool};

use crate::entities::{LedgerStateEntity, PaymentNotificationEntity};
use crate::metrics::QueryTimer;

const LEDGER_COLUMNS: &str = r#"
    id, provider_event_id, event_type, payload, processed, processed_at,
    attempt_count, last_error, last_attempt_at, dead_lettered, review_note,
    created_at, updated_at
"#;

/// Repository for the payment notification ledger.
#[derive(Clone)]
pub struct PaymentNotificationRepository {
    pool: PgPool,
}

impl PaymentNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim a notification for processing.
    ///
    /// Inserts the ledger row on first sight. For a known id the row is locked
    /// and claimed again only while it is neither processed nor dead-lettered.
    /// `attempt_count` counts finished attempts, so `prior_attempts` is 0 on
    /// first sight.
    pub async fn record_attempt(
        conn: &mut PgConnection,
        provider_event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<AttemptClaim, sqlx::Error> {
        let timer = QueryTimer::new("record_payment_notification_attempt");
        let claimed = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO payment_notifications (provider_event_id, event_type, payload, last_attempt_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (provider_event_id) DO UPDATE SET
                last_attempt_at = NOW(),
                updated_at = NOW()
            WHERE payment_notifications.processed = FALSE
              AND payment_notifications.dead_lettered = FALSE
            RETURNING attempt_count
            "#,
        )
        .bind(provider_event_id)
        .bind(event_type)
        .bind(payload)
        .fetch_optional(&mut *conn)
        .await?;

        let claim = match claimed {
            Some(prior_attempts) => AttemptClaim::Claimed { prior_attempts },
            None => {
                let state = sqlx::query_as::<_, LedgerStateEntity>(
                    r#"
                    SELECT processed, dead_lettered, attempt_count
                    FROM payment_notifications
                    WHERE provider_event_id = $1
                    "#,
                )
                .bind(provider_event_id)
                .fetch_one(&mut *conn)
                .await?;

                if state.processed {
                    AttemptClaim::AlreadyProcessed
                } else {
                    AttemptClaim::DeadLettered {
                        attempts: state.attempt_count,
                    }
                }
            }
        };
        timer.record();
        Ok(claim)
    }

    /// Mark a claimed notification processed, in the same transaction as its
    /// side effects.
    pub async fn mark_processed(
        conn: &mut PgConnection,
        provider_event_id: &str,
        review_note: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("mark_payment_notification_processed");
        sqlx::query(
            r#"
            UPDATE payment_notifications
            SET processed = TRUE,
                processed_at = NOW(),
                attempt_count = attempt_count + 1,
                last_error = NULL,
                review_note = $2,
                updated_at = NOW()
            WHERE provider_event_id = $1
            "#,
        )
        .bind(provider_event_id)
        .bind(review_note)
        .execute(&mut *conn)
        .await?;
        timer.record();
        Ok(())
    }

    /// Park a claimed notification for manual review, in the claiming
    /// transaction. Used for references that can never resolve.
    pub async fn mark_dead_lettered(
        conn: &mut PgConnection,
        provider_event_id: &str,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("dead_letter_payment_notification");
        sqlx::query(
            r#"
            UPDATE payment_notifications
            SET dead_lettered = TRUE,
                attempt_count = attempt_count + 1,
                last_error = $2,
                review_note = $2,
                updated_at = NOW()
            WHERE provider_event_id = $1
            "#,
        )
        .bind(provider_event_id)
        .bind(reason)
        .execute(&mut *conn)
        .await?;
        timer.record();
        Ok(())
    }

    /// Record a failed attempt after the processing transaction rolled back.
    ///
    /// Upserts so the failure is kept even though the claim insert was rolled
    /// back. Dead-letters once `max_attempts` is reached. Returns whether the
    /// notification is now dead-lettered; a notification that was processed
    /// concurrently is left untouched.
    pub async fn mark_failed(
        &self,
        provider_event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
        error: &str,
        max_attempts: i32,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mark_payment_notification_failed");
        let result = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO payment_notifications
                (provider_event_id, event_type, payload, attempt_count, last_error, last_attempt_at, dead_lettered)
            VALUES ($1, $2, $3, 1, $4, NOW(), 1 >= $5)
            ON CONFLICT (provider_event_id) DO UPDATE SET
                attempt_count = payment_notifications.attempt_count + 1,
                last_error = EXCLUDED.last_error,
                last_attempt_at = NOW(),
                dead_lettered = payment_notifications.attempt_count + 1 >= $5,
                updated_at = NOW()
            WHERE payment_notifications.processed = FALSE
            RETURNING dead_lettered
            "#,
        )
        .bind(provider_event_id)
        .bind(event_type)
        .bind(payload)
        .bind(error)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result?.unwrap_or(false))
    }

    /// Unprocessed, live notifications whose retry backoff has elapsed.
    ///
    /// Backoff doubles per failed attempt, capped at one hour.
    pub async fn find_retryable(
        &self,
        limit: i64,
    ) -> Result<Vec<PaymentNotificationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_retryable_payment_notifications");
        let result = sqlx::query_as::<_, PaymentNotificationEntity>(&format!(
            r#"
            SELECT {}
            FROM payment_notifications
            WHERE processed = FALSE
              AND dead_lettered = FALSE
              AND attempt_count > 0
              AND last_attempt_at < NOW() - make_interval(mins => LEAST(POWER(2, attempt_count - 1)::int, 60))
            ORDER BY last_attempt_at
            LIMIT $1
            "#,
            LEDGER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find a ledger entry by provider event id.
    pub async fn find_by_provider_event_id(
        &self,
        provider_event_id: &str,
    ) -> Result<Option<PaymentNotificationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_payment_notification");
        let result = sqlx::query_as::<_, PaymentNotificationEntity>(&format!(
            "SELECT {} FROM payment_notifications WHERE provider_event_id = $1",
            LEDGER_COLUMNS
        ))
        .bind(provider_event_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Notifications flagged for manual review (dead-lettered, or processed
    /// with a review note), newest first.
    pub async fn list_for_review(
        &self,
        limit: i64,
    ) -> Result<Vec<PaymentNotificationEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_payment_notifications_for_review");
        let result = sqlx::query_as::<_, PaymentNotificationEntity>(&format!(
            r#"
            SELECT {}
            FROM payment_notifications
            WHERE dead_lettered = TRUE OR review_note IS NOT NULL
            ORDER BY created_at DESC
            LIMIT $1
            "#,
            LEDGER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}
