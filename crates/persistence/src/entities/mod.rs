//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod event;
pub mod event_image;
pub mod payment_notification;
pub mod registration;
pub mod reminder;
pub mod ticket;

pub use event::{EventEntity, UserEntity};
pub use event_image::EventImageEntity;
pub use payment_notification::{LedgerStateEntity, PaymentNotificationEntity};
pub use registration::{PaymentStatusDb, RegistrationEntity};
pub use reminder::{ReminderCandidateEntity, ReminderSentEntity};
pub use ticket::{NewTicket, TicketEntity};
