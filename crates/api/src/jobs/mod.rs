//! Background job scheduler and job implementations.

mod checkout_expiry;
mod event_reminders;
mod payment_notification_retry;
mod pool_metrics;
mod primary_image_sweep;
mod scheduler;

pub use checkout_expiry::CheckoutExpiryJob;
pub use event_reminders::EventReminderJob;
pub use payment_notification_retry::PaymentNotificationRetryJob;
pub use pool_metrics::PoolMetricsJob;
pub use primary_image_sweep::PrimaryImageSweepJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
