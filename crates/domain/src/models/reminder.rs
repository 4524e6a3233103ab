//! Pre-event reminder types and the deduplication ledger result.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Reminder categories, each sent at most once per registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderType {
    #[serde(rename = "7day")]
    OneWeek,
    #[serde(rename = "2day")]
    TwoDays,
    #[serde(rename = "1day")]
    OneDay,
}

impl ReminderType {
    pub const ALL: [ReminderType; 3] = [
        ReminderType::OneWeek,
        ReminderType::TwoDays,
        ReminderType::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderType::OneWeek => "7day",
            ReminderType::TwoDays => "2day",
            ReminderType::OneDay => "1day",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Hours before the event start at which this reminder is due.
    pub fn lead_hours(&self) -> i64 {
        match self {
            ReminderType::OneWeek => 168,
            ReminderType::TwoDays => 48,
            ReminderType::OneDay => 24,
        }
    }

    /// Start-time window, relative to `now`, for events due this reminder.
    ///
    /// The window spans one hour either side of the lead time so an hourly
    /// job never misses an event.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let lead = self.lead_hours();
        (
            now + Duration::hours(lead - 1),
            now + Duration::hours(lead + 1),
        )
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReminderType::OneWeek => "Your event is in one week. Mark your calendar!",
            ReminderType::TwoDays => "Your event is in 2 days. Don't forget!",
            ReminderType::OneDay => "Your event is tomorrow! See you there.",
        }
    }
}

impl std::fmt::Display for ReminderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `try_send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrySendOutcome {
    /// Recorded now; the caller performs the dispatch.
    Sent,
    /// Another process already recorded it; do not dispatch.
    AlreadySent,
}

impl TrySendOutcome {
    pub fn should_dispatch(&self) -> bool {
        matches!(self, TrySendOutcome::Sent)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrySendOutcome::Sent => "sent",
            TrySendOutcome::AlreadySent => "already_sent",
        }
    }
}

/// Ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderSentRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub reminder_type: ReminderType,
    pub recipient_email: String,
    pub sent_at: DateTime<Utc>,
}

/// A registration due a reminder, as selected by the reminder job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderCandidate {
    pub event_id: Uuid,
    pub event_title: String,
    pub event_starts_at: DateTime<Utc>,
    pub registration_id: Uuid,
    pub recipient_email: String,
}

/// Request payload for the reminder trigger endpoint.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct TrySendReminderRequest {
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub reminder_type: ReminderType,

    #[validate(email(message = "Invalid recipient email"))]
    pub recipient: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrySendReminderResponse {
    pub outcome: TrySendOutcome,
    pub should_dispatch: bool,
}
