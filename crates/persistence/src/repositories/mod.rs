//! Repository implementations for database operations.

pub mod event;
pub mod event_image;
pub mod payment_notification;
pub mod registration;
pub mod reminder;
pub mod ticket;

pub use event::EventRepository;
pub use event_image::EventImageRepository;
pub use payment_notification::PaymentNotificationRepository;
pub use registration::RegistrationRepository;
pub use reminder::ReminderRepository;
pub use ticket::TicketRepository;
