//! Periodic repair of events whose image set has no single primary.

use tracing::info;

use crate::services::EventImageService;

use super::scheduler::{Job, JobFrequency};

pub struct PrimaryImageSweepJob {
    images: EventImageService,
    interval_minutes: u64,
    batch_size: i64,
}

impl PrimaryImageSweepJob {
    pub fn new(images: EventImageService, interval_minutes: u64, batch_size: i64) -> Self {
        Self {
            images,
            interval_minutes: interval_minutes.max(1),
            batch_size,
        }
    }
}

#[async_trait::async_trait]
impl Job for PrimaryImageSweepJob {
    fn name(&self) -> &'static str {
        "primary_image_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let repaired = self
            .images
            .sweep(self.batch_size)
            .await
            .map_err(|e| format!("Primary image sweep failed: {}", e))?;

        if repaired > 0 {
            info!(repaired = repaired, "Primary image invariant restored");
        }
        Ok(())
    }
}

