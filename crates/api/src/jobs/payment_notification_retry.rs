//! Re-processes payment notifications whose earlier attempts failed.

use tracing::info;

use crate::services::PaymentNotificationService;

use super::scheduler::{Job, JobFrequency};

pub struct PaymentNotificationRetryJob {
    notifications: PaymentNotificationService,
    batch_size: i64,
}

impl PaymentNotificationRetryJob {
    pub fn new(notifications: PaymentNotificationService, batch_size: i64) -> Self {
        Self {
            notifications,
            batch_size,
        }
    }
}

#[async_trait::async_trait]
impl Job for PaymentNotificationRetryJob {
    fn name(&self) -> &'static str {
        "payment_notification_retry"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(1)
    }

    async fn execute(&self) -> Result<(), String> {
        let succeeded = self
            .notifications
            .retry_pending(self.batch_size)
            .await
            .map_err(|e| format!("Failed to load retryable notifications: {}", e))?;

        if succeeded > 0 {
            info!(succeeded = succeeded, "Payment notifications reprocessed");
        }
        Ok(())
    }
}
