//! Outbound notification delivery.
//!
//! Notifications are sent after the state change that caused them has been
//! committed. A failed delivery is logged and counted; it never touches the
//! registration again.

use std::sync::Arc;

use domain::models::Registration;
use domain::services::{
    MockNotificationDispatcher, Notification, NotificationDispatcher, NotificationResult,
};
use metrics::counter;
use persistence::repositories::EventRepository;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::NotificationsConfig;

/// Dispatcher that writes notifications to the log. Used until a delivery
/// channel is wired in.
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotificationDispatcher;

#[async_trait::async_trait]
impl NotificationDispatcher for ConsoleNotificationDispatcher {
    async fn dispatch(&self, recipient: &str, notification: &Notification) -> NotificationResult {
        match serde_json::to_string(notification) {
            Ok(body) => {
                info!(
                    recipient = %recipient,
                    notification_type = %notification.notification_type(),
                    body = %body,
                    "Notification dispatched to console"
                );
                NotificationResult::Sent
            }
            Err(e) => NotificationResult::Failed(e.to_string()),
        }
    }
}

/// Builds the dispatcher named by configuration.
pub fn build_dispatcher(config: &NotificationsConfig) -> Arc<dyn NotificationDispatcher> {
    match config.provider.as_str() {
        "mock" => Arc::new(MockNotificationDispatcher::new()),
        "console" => Arc::new(ConsoleNotificationDispatcher),
        other => {
            warn!(provider = other, "Unknown notification provider, using console");
            Arc::new(ConsoleNotificationDispatcher)
        }
    }
}

/// Resolves where notifications for a registration go: the address stored on
/// the registration, else the owning user's email.
pub async fn recipient_for(
    events: &EventRepository,
    registration: &Registration,
) -> Result<Option<String>, sqlx::Error> {
    if let Some(email) = registration.shape.contact_email() {
        return Ok(Some(email.to_string()));
    }
    match registration.user_id() {
        Some(user_id) => Ok(events.find_user(user_id).await?.map(|u| u.email)),
        None => Ok(None),
    }
}

/// Sends `notification` for a committed registration change. Best effort.
pub async fn notify_after_commit(
    pool: &PgPool,
    dispatcher: &dyn NotificationDispatcher,
    registration: &Registration,
    notification: Notification,
) -> NotificationResult {
    let events = EventRepository::new(pool.clone());
    let recipient = match recipient_for(&events, registration).await {
        Ok(Some(recipient)) => recipient,
        Ok(None) => {
            warn!(
                registration_id = %registration.id,
                "No recipient for notification, skipping"
            );
            record(&notification, &NotificationResult::Skipped);
            return NotificationResult::Skipped;
        }
        Err(e) => {
            let result = NotificationResult::Failed(e.to_string());
            warn!(
                registration_id = %registration.id,
                error = %e,
                "Could not resolve notification recipient"
            );
            record(&notification, &result);
            return result;
        }
    };

    let result = dispatcher.dispatch(&recipient, &notification).await;
    if let NotificationResult::Failed(reason) = &result {
        warn!(
            registration_id = %registration.id,
            notification_type = %notification.notification_type(),
            reason = %reason,
            "Notification delivery failed"
        );
    }
    record(&notification, &result);
    result
}

fn record(notification: &Notification, result: &NotificationResult) {
    let outcome = match result {
        NotificationResult::Sent => "sent",
        NotificationResult::Failed(_) => "failed",
        NotificationResult::Skipped => "skipped",
    };
    counter!(
        "notifications_dispatched_total",
        "type" => notification.notification_type().to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_console_dispatcher_sends() {
        let notification = Notification::PaymentFailed {
            registration_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
        };
        let result = ConsoleNotificationDispatcher
            .dispatch("guest@example.com", &notification)
            .await;
        assert_eq!(result, NotificationResult::Sent);
    }

    #[test]
    fn test_build_dispatcher_unknown_provider_falls_back() {
        let config = NotificationsConfig {
            provider: "pager".into(),
        };
        // Must not panic; the console dispatcher is used instead.
        let _dispatcher = build_dispatcher(&config);
    }
}
