//! Hourly reminder run.
//!
//! Each reminder type covers a two-hour window around its lead time, so an
//! hourly run sees every event at least once and the ledger keeps the second
//! sighting from sending again.

use chrono::Utc;
use domain::models::ReminderType;
use tracing::info;

use crate::services::ReminderService;

use super::scheduler::{Job, JobFrequency};

pub struct EventReminderJob {
    reminders: ReminderService,
    batch_size: i64,
}

impl EventReminderJob {
    pub fn new(reminders: ReminderService, batch_size: i64) -> Self {
        Self {
            reminders,
            batch_size,
        }
    }
}

#[async_trait::async_trait]
impl Job for EventReminderJob {
    fn name(&self) -> &'static str {
        "event_reminders"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        let now = Utc::now();
        let mut failures = Vec::new();

        for reminder_type in ReminderType::ALL {
            match self
                .reminders
                .run_due(reminder_type, now, self.batch_size)
                .await
            {
                Ok(summary) if summary.failed > 0 => failures.push(format!(
                    "{}: {} of {} failed",
                    reminder_type,
                    summary.failed,
                    summary.sent + summary.already_sent + summary.failed
                )),
                Ok(summary) => info!(
                    reminder_type = %reminder_type,
                    sent = summary.sent,
                    already_sent = summary.already_sent,
                    "Reminders processed"
                ),
                Err(e) => failures.push(format!("{}: {}", reminder_type, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    }
}
