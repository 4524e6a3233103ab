//! Processing of inbound payment provider notifications.
//!
//! One notification is handled in one transaction:
//!
//! 1. claim the provider event id in the ledger
//! 2. lock the registration it refers to
//! 3. apply the trigger through the state machine, issuing or invalidating
//!    the ticket
//! 4. mark the ledger entry processed
//!
//! Anything that fails rolls all of it back; the failure is then recorded on
//! the ledger in a separate statement so the retry job can pick it up.

use std::sync::Arc;

use domain::models::payment_notification::ProviderReference;
use domain::models::{
    AttemptClaim, NotificationOutcome, PaymentNotificationRecord, ProviderNotification,
    Registration, TransitionDecision,
};
use domain::services::{Notification, NotificationDispatcher};
use metrics::counter;
use persistence::entities::RegistrationEntity;
use persistence::repositories::{PaymentNotificationRepository, RegistrationRepository};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{error, info, warn};

use super::notifications::notify_after_commit;
use super::payments::apply_trigger;
use super::tickets::{TicketError, TicketIssuer};
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ticket error: {0}")]
    Ticket(#[from] TicketError),
}

/// A failed notification has been rolled back and must be redelivered, so
/// every processing error answers 5xx. Constraint violations included.
impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::Database(_) | ProcessingError::Ticket(TicketError::Database(_)) => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            ProcessingError::Ticket(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// How a notification's reference resolved against stored registrations.
enum Resolution {
    Found(Registration),
    Unresolvable(String),
}

#[derive(Clone)]
pub struct PaymentNotificationService {
    pool: PgPool,
    ledger: PaymentNotificationRepository,
    issuer: TicketIssuer,
    dispatcher: Arc<dyn NotificationDispatcher>,
    max_attempts: i32,
}

impl PaymentNotificationService {
    pub fn new(
        pool: PgPool,
        issuer: TicketIssuer,
        dispatcher: Arc<dyn NotificationDispatcher>,
        max_attempts: i32,
    ) -> Self {
        Self {
            ledger: PaymentNotificationRepository::new(pool.clone()),
            pool,
            issuer,
            dispatcher,
            max_attempts,
        }
    }

    /// Process one verified notification.
    ///
    /// An `Err` means the work was rolled back and should be retried; the
    /// failure has already been recorded on the ledger.
    pub async fn process(
        &self,
        notification: &ProviderNotification,
    ) -> Result<NotificationOutcome, ProcessingError> {
        match self.process_in_transaction(notification).await {
            Ok((outcome, followup)) => {
                counter!("payment_notifications_total", "outcome" => outcome.label()).increment(1);
                info!(
                    provider_event_id = %notification.provider_event_id,
                    event_type = %notification.raw_type,
                    outcome = outcome.label(),
                    "Payment notification handled"
                );
                if let Some((registration, message)) = followup {
                    notify_after_commit(&self.pool, self.dispatcher.as_ref(), &registration, message)
                        .await;
                }
                Ok(outcome)
            }
            Err(e) => {
                counter!("payment_notifications_total", "outcome" => "failed").increment(1);
                self.record_failure(notification, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Re-run notifications whose earlier attempts failed and whose backoff
    /// has elapsed. Returns how many were processed successfully.
    pub async fn retry_pending(&self, batch_size: i64) -> Result<usize, sqlx::Error> {
        let pending = self.ledger.find_retryable(batch_size).await?;
        let mut succeeded = 0;

        for entry in pending {
            let notification = match ProviderNotification::from_value(entry.payload.clone()) {
                Ok(n) => n,
                Err(e) => {
                    // A stored payload that no longer parses will never succeed.
                    error!(
                        provider_event_id = %entry.provider_event_id,
                        error = %e,
                        "Stored notification payload unreadable, dead-lettering"
                    );
                    self.ledger
                        .mark_failed(
                            &entry.provider_event_id,
                            &entry.event_type,
                            &entry.payload,
                            &e.to_string(),
                            1,
                        )
                        .await?;
                    continue;
                }
            };

            match self.process(&notification).await {
                Ok(_) => succeeded += 1,
                Err(e) => warn!(
                    provider_event_id = %entry.provider_event_id,
                    attempts = entry.attempt_count + 1,
                    error = %e,
                    "Notification retry failed"
                ),
            }
        }

        Ok(succeeded)
    }

    /// Ledger entries an operator has to look at: dead-lettered ones and
    /// ones processed with a review note. Newest first.
    pub async fn review_queue(
        &self,
        limit: i64,
    ) -> Result<Vec<PaymentNotificationRecord>, sqlx::Error> {
        let entries = self.ledger.list_for_review(limit).await?;
        Ok(entries.into_iter().map(Into::into).collect())
    }

    async fn process_in_transaction(
        &self,
        notification: &ProviderNotification,
    ) -> Result<(NotificationOutcome, Option<(Registration, Notification)>), ProcessingError> {
        let event_id = notification.provider_event_id.as_str();
        let mut tx = self.pool.begin().await?;

        let claim = PaymentNotificationRepository::record_attempt(
            &mut tx,
            event_id,
            &notification.raw_type,
            &notification.payload,
        )
        .await?;

        match claim {
            AttemptClaim::AlreadyProcessed => {
                tx.commit().await?;
                return Ok((NotificationOutcome::Duplicate, None));
            }
            AttemptClaim::DeadLettered { attempts } => {
                tx.commit().await?;
                warn!(
                    provider_event_id = %event_id,
                    attempts = attempts,
                    "Notification is dead-lettered, awaiting review"
                );
                return Ok((NotificationOutcome::DeadLettered, None));
            }
            AttemptClaim::Claimed { prior_attempts } if prior_attempts > 0 => {
                info!(
                    provider_event_id = %event_id,
                    prior_attempts = prior_attempts,
                    "Reprocessing notification"
                );
            }
            AttemptClaim::Claimed { .. } => {}
        }

        let Some(trigger) = notification.event_type.trigger() else {
            PaymentNotificationRepository::mark_processed(&mut tx, event_id, None).await?;
            tx.commit().await?;
            return Ok((NotificationOutcome::Ignored, None));
        };

        let registration = match Self::resolve(&mut tx, notification).await? {
            Resolution::Found(registration) => registration,
            Resolution::Unresolvable(reason) => {
                warn!(
                    provider_event_id = %event_id,
                    reason = %reason,
                    "Notification references no known registration"
                );
                PaymentNotificationRepository::mark_dead_lettered(&mut tx, event_id, &reason)
                    .await?;
                tx.commit().await?;
                return Ok((NotificationOutcome::UnknownReference, None));
            }
        };

        let applied = apply_trigger(
            &mut tx,
            &self.issuer,
            registration,
            trigger,
            notification.payment_intent_id.as_deref(),
        )
        .await?;

        let registration_id = applied.registration.id;
        let (outcome, review_note) = match applied.decision {
            TransitionDecision::Apply { from, to, .. } => (
                NotificationOutcome::Applied {
                    registration_id,
                    from,
                    to,
                },
                None,
            ),
            TransitionDecision::AlreadyApplied { .. } => {
                (NotificationOutcome::AlreadyApplied { registration_id }, None)
            }
            TransitionDecision::Illegal { from, trigger } => (
                NotificationOutcome::IllegalTransition { registration_id },
                Some(format!("illegal transition: {} while {}", trigger, from)),
            ),
        };

        PaymentNotificationRepository::mark_processed(&mut tx, event_id, review_note.as_deref())
            .await?;
        tx.commit().await?;

        let followup = applied
            .notification()
            .map(|message| (applied.registration, message));
        Ok((outcome, followup))
    }

    /// Locks the registration the notification refers to.
    async fn resolve(
        conn: &mut PgConnection,
        notification: &ProviderNotification,
    ) -> Result<Resolution, ProcessingError> {
        let claimed = notification.claimed_registration_id;

        let entity: Option<RegistrationEntity> = match &notification.reference {
            Some(ProviderReference::CheckoutSession(session_id)) => {
                RegistrationRepository::lock_by_checkout_session(conn, session_id).await?
            }
            Some(ProviderReference::PaymentIntent(intent_id)) => {
                let mut matches =
                    RegistrationRepository::lock_by_payment_intent(conn, intent_id).await?;
                match matches.len() {
                    0 => match claimed {
                        // The intent was never recorded (completion arrived
                        // without one); fall back to the echoed registration id.
                        Some(id) => RegistrationRepository::lock_by_id(conn, id)
                            .await?
                            .filter(|r| r.payment_intent_id.is_none()),
                        None => None,
                    },
                    1 => matches.pop(),
                    n => {
                        return Ok(Resolution::Unresolvable(format!(
                            "payment intent {} matches {} registrations",
                            intent_id, n
                        )))
                    }
                }
            }
            None => None,
        };

        let Some(entity) = entity else {
            let reference = notification
                .reference
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "none".to_string());
            return Ok(Resolution::Unresolvable(format!(
                "no registration for {}",
                reference
            )));
        };

        if let Some(claimed) = claimed {
            if claimed != entity.id {
                return Ok(Resolution::Unresolvable(format!(
                    "reference resolves to registration {} but notification names {}",
                    entity.id, claimed
                )));
            }
        }

        Ok(Resolution::Found(Registration::try_from(entity)?))
    }

    async fn record_failure(&self, notification: &ProviderNotification, error: &str) {
        match self
            .ledger
            .mark_failed(
                &notification.provider_event_id,
                &notification.raw_type,
                &notification.payload,
                error,
                self.max_attempts,
            )
            .await
        {
            Ok(true) => {
                counter!("payment_notifications_dead_lettered_total").increment(1);
                error!(
                    provider_event_id = %notification.provider_event_id,
                    error = %error,
                    "Notification dead-lettered after repeated failures"
                );
            }
            Ok(false) => warn!(
                provider_event_id = %notification.provider_event_id,
                error = %error,
                "Notification processing failed, will retry"
            ),
            Err(e) => error!(
                provider_event_id = %notification.provider_event_id,
                error = %e,
                "Could not record notification failure"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_failures_ask_for_redelivery() {
        let error: ApiError = ProcessingError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(error, ApiError::ServiceUnavailable(_)));
        assert!(error.is_retryable());

        let error: ApiError = ProcessingError::Database(sqlx::Error::RowNotFound).into();
        assert!(matches!(error, ApiError::ServiceUnavailable(_)));
    }

    #[test]
    fn test_ticket_failures_ask_for_redelivery() {
        let error: ApiError =
            ProcessingError::Ticket(TicketError::Database(sqlx::Error::RowNotFound)).into();
        assert!(matches!(error, ApiError::ServiceUnavailable(_)));
        assert!(error.is_retryable());

        let error: ApiError = ProcessingError::Ticket(TicketError::EventNotFound(
            uuid::Uuid::nil(),
        ))
        .into();
        assert!(matches!(error, ApiError::Internal(_)));
        assert!(error.is_retryable());
    }
}
