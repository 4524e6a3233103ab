//! Notification dispatch seam.
//!
//! The core decides that a notification is due; rendering and delivery belong
//! to the dispatcher implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::reminder::ReminderType;

/// Notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    RegistrationConfirmed,
    PaymentFailed,
    RefundProcessed,
    EventReminder,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::RegistrationConfirmed => write!(f, "registration_confirmed"),
            NotificationType::PaymentFailed => write!(f, "payment_failed"),
            NotificationType::RefundProcessed => write!(f, "refund_processed"),
            NotificationType::EventReminder => write!(f, "event_reminder"),
        }
    }
}

/// Notification content handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    RegistrationConfirmed {
        registration_id: Uuid,
        event_id: Uuid,
        ticket_code: String,
    },
    PaymentFailed {
        registration_id: Uuid,
        event_id: Uuid,
    },
    RefundProcessed {
        registration_id: Uuid,
        event_id: Uuid,
    },
    EventReminder {
        registration_id: Uuid,
        event_id: Uuid,
        event_title: String,
        event_starts_at: DateTime<Utc>,
        reminder_type: ReminderType,
        message: String,
    },
}

impl Notification {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            Notification::RegistrationConfirmed { .. } => NotificationType::RegistrationConfirmed,
            Notification::PaymentFailed { .. } => NotificationType::PaymentFailed,
            Notification::RefundProcessed { .. } => NotificationType::RefundProcessed,
            Notification::EventReminder { .. } => NotificationType::EventReminder,
        }
    }

    pub fn registration_id(&self) -> Uuid {
        match self {
            Notification::RegistrationConfirmed { registration_id, .. }
            | Notification::PaymentFailed { registration_id, .. }
            | Notification::RefundProcessed { registration_id, .. }
            | Notification::EventReminder { registration_id, .. } => *registration_id,
        }
    }
}

/// Result of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    /// Accepted by the delivery channel.
    Sent,
    /// Delivery failed.
    Failed(String),
    /// No address known for the recipient.
    Skipped,
}

impl NotificationResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, NotificationResult::Failed(_))
    }
}

/// Dispatcher trait for outbound notifications.
#[async_trait::async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification to `recipient`.
    async fn dispatch(&self, recipient: &str, notification: &Notification) -> NotificationResult;
}

/// Recorded dispatch, kept by [`MockNotificationDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub recipient: String,
    pub notification: Notification,
}

/// Mock dispatcher for development and testing.
///
/// Records every notification. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MockNotificationDispatcher {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl MockNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock dispatcher that simulates failures.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Snapshot of everything dispatched so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count_of(&self, notification_type: NotificationType) -> usize {
        self.sent()
            .iter()
            .filter(|s| s.notification.notification_type() == notification_type)
            .count()
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for MockNotificationDispatcher {
    async fn dispatch(&self, recipient: &str, notification: &Notification) -> NotificationResult {
        if self.simulate_failure {
            tracing::warn!(
                recipient = %recipient,
                notification_type = %notification.notification_type(),
                "Mock notification dispatcher simulating failure"
            );
            return NotificationResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            recipient = %recipient,
            notification_type = %notification.notification_type(),
            registration_id = %notification.registration_id(),
            "Mock: Would send notification"
        );

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentNotification {
                recipient: recipient.to_string(),
                notification: notification.clone(),
            });
        }

        NotificationResult::Sent
    }
}
