//! Reminder deduplication and the reminder run.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::models::reminder::ReminderCandidate;
use domain::models::{ReminderType, TrySendOutcome};
use domain::services::{Notification, NotificationDispatcher, NotificationResult};
use metrics::counter;
use persistence::repositories::ReminderRepository;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The dispatch failed and the ledger entry was rolled back.
    #[error("Reminder dispatch failed: {0}")]
    DispatchFailed(String),
}

impl From<ReminderError> for ApiError {
    fn from(err: ReminderError) -> Self {
        match err {
            ReminderError::Database(e) => e.into(),
            ReminderError::DispatchFailed(reason) => ApiError::ServiceUnavailable(reason),
        }
    }
}

/// Tally of one reminder run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReminderRunSummary {
    pub sent: usize,
    pub already_sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ReminderService {
    pool: PgPool,
    reminders: ReminderRepository,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl ReminderService {
    pub fn new(pool: PgPool, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            reminders: ReminderRepository::new(pool.clone()),
            pool,
            dispatcher,
        }
    }

    /// Record that a reminder is being sent. Only a `Sent` answer entitles the
    /// caller to dispatch; `AlreadySent` must never be retried.
    pub async fn try_send(
        &self,
        event_id: Uuid,
        registration_id: Uuid,
        reminder_type: ReminderType,
        recipient: &str,
    ) -> Result<TrySendOutcome, ReminderError> {
        let mut conn = self.pool.acquire().await?;
        let recorded =
            ReminderRepository::try_record(&mut conn, event_id, registration_id, reminder_type, recipient)
                .await?;

        let outcome = if recorded.is_some() {
            TrySendOutcome::Sent
        } else {
            TrySendOutcome::AlreadySent
        };
        record(reminder_type, outcome.label());
        Ok(outcome)
    }

    /// Record and dispatch in one transaction. A failed dispatch rolls the
    /// record back so a later run can try again; a concurrent duplicate waits
    /// on the unique index and then sees `AlreadySent`.
    pub async fn try_send_with<F, Fut>(
        &self,
        event_id: Uuid,
        registration_id: Uuid,
        reminder_type: ReminderType,
        recipient: &str,
        dispatch: F,
    ) -> Result<TrySendOutcome, ReminderError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = NotificationResult> + Send,
    {
        let mut tx = self.pool.begin().await?;
        let recorded =
            ReminderRepository::try_record(&mut tx, event_id, registration_id, reminder_type, recipient)
                .await?;

        if recorded.is_none() {
            tx.rollback().await?;
            record(reminder_type, TrySendOutcome::AlreadySent.label());
            return Ok(TrySendOutcome::AlreadySent);
        }

        match dispatch().await {
            NotificationResult::Failed(reason) => {
                tx.rollback().await?;
                record(reminder_type, "failed");
                Err(ReminderError::DispatchFailed(reason))
            }
            NotificationResult::Sent | NotificationResult::Skipped => {
                tx.commit().await?;
                record(reminder_type, TrySendOutcome::Sent.label());
                Ok(TrySendOutcome::Sent)
            }
        }
    }

    /// Send every reminder of `reminder_type` that is due at `now`.
    pub async fn run_due(
        &self,
        reminder_type: ReminderType,
        now: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<ReminderRunSummary, ReminderError> {
        let window = reminder_type.window(now);
        let candidates: Vec<ReminderCandidate> = self
            .reminders
            .find_candidates(reminder_type, window, batch_size)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        debug!(
            reminder_type = %reminder_type,
            candidates = candidates.len(),
            "Reminder candidates selected"
        );

        let mut summary = ReminderRunSummary::default();
        for candidate in candidates {
            let notification = Notification::EventReminder {
                registration_id: candidate.registration_id,
                event_id: candidate.event_id,
                event_title: candidate.event_title.clone(),
                event_starts_at: candidate.event_starts_at,
                reminder_type,
                message: reminder_type.message().to_string(),
            };
            let dispatcher = Arc::clone(&self.dispatcher);
            let recipient = candidate.recipient_email.clone();

            let result = self
                .try_send_with(
                    candidate.event_id,
                    candidate.registration_id,
                    reminder_type,
                    &candidate.recipient_email,
                    || async move { dispatcher.dispatch(&recipient, &notification).await },
                )
                .await;

            match result {
                Ok(TrySendOutcome::Sent) => summary.sent += 1,
                Ok(TrySendOutcome::AlreadySent) => summary.already_sent += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        registration_id = %candidate.registration_id,
                        reminder_type = %reminder_type,
                        error = %e,
                        "Reminder not sent"
                    );
                }
            }
        }

        if summary.sent > 0 || summary.failed > 0 {
            info!(
                reminder_type = %reminder_type,
                sent = summary.sent,
                already_sent = summary.already_sent,
                failed = summary.failed,
                "Reminder run finished"
            );
        }
        Ok(summary)
    }
}

fn record(reminder_type: ReminderType, outcome: &'static str) {
    counter!(
        "reminders_sent_total",
        "type" => reminder_type.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
