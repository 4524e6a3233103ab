//! Fails pending registrations whose checkout lapsed without a provider
//! notification.

use tracing::info;

use crate::services::RegistrationService;

use super::scheduler::{Job, JobFrequency};

pub struct CheckoutExpiryJob {
    registrations: RegistrationService,
    batch_size: i64,
}

impl CheckoutExpiryJob {
    pub fn new(registrations: RegistrationService, batch_size: i64) -> Self {
        Self {
            registrations,
            batch_size,
        }
    }
}

#[async_trait::async_trait]
impl Job for CheckoutExpiryJob {
    fn name(&self) -> &'static str {
        "checkout_expiry"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(15)
    }

    async fn execute(&self) -> Result<(), String> {
        let expired = self
            .registrations
            .expire_stale_checkouts(self.batch_size)
            .await
            .map_err(|e| format!("Checkout expiry failed: {}", e))?;

        if expired > 0 {
            info!(expired = expired, "Stale checkouts expired");
        }
        Ok(())
    }
}
