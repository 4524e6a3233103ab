//! Application services: transactional workflows over the repositories.

pub mod checkout;
pub mod images;
pub mod notifications;
pub mod payment_notifications;
pub mod payments;
pub mod registrations;
pub mod reminders;
pub mod tickets;

pub use checkout::build_checkout_provider;
pub use images::EventImageService;
pub use notifications::build_dispatcher;
pub use payment_notifications::PaymentNotificationService;
pub use registrations::{CheckoutSettings, RegistrationService};
pub use reminders::ReminderService;
pub use tickets::TicketIssuer;
